//! JavaScript side of the codec
//!
//! The decoder helpers are plain JavaScript text with `%NAME%` placeholders
//! that are replaced by names drawn from the run's [`NameGenerator`]. Each
//! helper mirrors one Rust stage:
//!
//! | helper | Rust counterpart |
//! |---|---|
//! | `REBUILD` | [`crate::SecretBundle::rebuild`] |
//! | `BOOT` | [`crate::BootstrapProgram::run`] |
//! | `CHACHA` | [`crate::CipherKey::apply`] |
//! | `DECODE` | [`crate::decode`] plus payload parsing, memoized by id |

use shroud_ast::{BinaryOp, Expr, Lit, UnaryOp};
use shroud_common::NameGenerator;
use shroud_vm_bytecode::{Constant, OpcodeMap};

use crate::payload::ArtifactKind;
use crate::wire::WireBundle;

const DECODER_TEMPLATE: &str = r#"var %CACHE%={};
function %REBUILD%(m,k,o,x){var r=[];for(var i=0;i<m.length;i++)r[o[i]^x]=m[i]^k[i];return r}
function %BOOT%(ops,prog,pool){var st=[],sl={},i=0,o,a,b,c,d,s,j;while(i<prog.length){o=prog[i++];if(o===ops[0])st.push(pool[prog[i++]]);else if(o===ops[1]){d=st.pop();c=st.pop();b=st.pop();a=st.pop();st.push(%REBUILD%(a,b,c,d[0]))}else if(o===ops[2]){a=st.pop();s="";for(j=0;j<a.length;j++)s+=String.fromCharCode(a[j]);st.push(s)}else if(o===ops[3])sl[prog[i++]]=st.pop();else throw Error("bad bootstrap")}return sl}
function %CHACHA%(key,nonce,data){function L(v,c){return v<<c|v>>>(32-c)}function Q(x,a,b,c,d){x[a]=x[a]+x[b]|0;x[d]=L(x[d]^x[a],16);x[c]=x[c]+x[d]|0;x[b]=L(x[b]^x[c],12);x[a]=x[a]+x[b]|0;x[d]=L(x[d]^x[a],8);x[c]=x[c]+x[d]|0;x[b]=L(x[b]^x[c],7)}function W(b,i){return b[i]|b[i+1]<<8|b[i+2]<<16|b[i+3]<<24}var s=[1634760805,857760878,2036477234,1797285236],i,j,p,n=0,x,out=[];for(i=0;i<8;i++)s.push(W(key,i*4));s.push(0);for(i=0;i<3;i++)s.push(W(nonce,i*4));for(p=0;p<data.length;p+=64){s[12]=n++;x=s.slice();for(i=0;i<10;i++){Q(x,0,4,8,12);Q(x,1,5,9,13);Q(x,2,6,10,14);Q(x,3,7,11,15);Q(x,0,5,10,15);Q(x,1,6,11,12);Q(x,2,7,8,13);Q(x,3,4,9,14)}for(i=0;i<16;i++){x[i]=x[i]+s[i]|0;for(j=0;j<4;j++)if(p+i*4+j<data.length)out.push(data[p+i*4+j]^(x[i]>>>8*j&255))}}return out}
function %DECODE%(id,kind,ops,prog,pool,slots,shards){if(id in %CACHE%)return %CACHE%[id];var sl=%BOOT%(ops,prog,pool),key=sl[slots[0]],lo=sl[slots[1]],hi=sl[slots[2]],al=sl[slots[3]],pa=sl[slots[4]],or=sl[slots[5]],t="",ix={},v=[],b=[],nc=[],r=[],i,j,n,s,g,d;for(i=0;i<or.length;i+=2)t+=shards[or[i]|or[i+1]<<8];for(i=0;i<64;i++)ix[al.charAt(i)]=i;for(i=0;i<t.length;i++){g=ix[t.charAt(i)];if(g===void 0)throw Error("bad symbol");v.push((g^pa[1])-pa[0]-i*pa[2]&63)}for(i=0;i<v.length;i+=4)b.push(v[i]<<2|v[i+1]>>4,(v[i+1]&15)<<4|v[i+2]>>2,(v[i+2]&3)<<6|v[i+3]);b.length=pa[3]|pa[4]<<8|pa[5]<<16|pa[6]<<24;for(i=0;i<12;i++)nc.push((i<6?lo[i]:hi[i-6])^key[i]^key[31-i]);b=%CHACHA%(key,nc,b);if(kind===0){for(i=0;i<b.length;i+=4)r.push((b[i]|b[i+1]<<8|b[i+2]<<16|b[i+3]<<24)>>>0)}else if(kind===1){s="";for(i=0;i<b.length;i++)s+=String.fromCharCode(b[i]);s=decodeURIComponent(escape(s));i=0;while(i<s.length){g=s.charAt(i);j=s.indexOf(":",i);n=+s.slice(i+1,j);d=s.substr(j+1,n);i=j+1+n;r.push(g==="u"?void 0:g==="n"?null:g==="b"?d==="1":g==="d"?+d:g==="s"?d:[d])}}else r=b;return %CACHE%[id]=r}
"#;

/// Names of the emitted decoder helpers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecNames {
    /// Memo object keyed by artifact id
    pub cache: String,
    /// Secret-bundle rebuild
    pub rebuild: String,
    /// Bootstrap interpreter
    pub boot: String,
    /// Keystream
    pub chacha: String,
    /// Entry point called by every bundle
    pub decode: String,
}

impl CodecNames {
    /// Draw fresh helper names
    pub fn generate(names: &mut NameGenerator) -> Self {
        Self {
            cache: names.fresh(),
            rebuild: names.fresh(),
            boot: names.fresh(),
            chacha: names.fresh(),
            decode: names.fresh(),
        }
    }
}

/// JavaScript source of the decoder helpers
pub fn decoder_source(names: &CodecNames) -> String {
    DECODER_TEMPLATE
        .replace("%CACHE%", &names.cache)
        .replace("%REBUILD%", &names.rebuild)
        .replace("%BOOT%", &names.boot)
        .replace("%CHACHA%", &names.chacha)
        .replace("%DECODE%", &names.decode)
}

/// Kind code understood by the decoder helper
pub fn kind_code(kind: ArtifactKind) -> u32 {
    match kind {
        ArtifactKind::Code => 0,
        ArtifactKind::Constants => 1,
        ArtifactKind::OpcodeTable => 2,
    }
}

fn words(values: impl IntoIterator<Item = u32>) -> Expr {
    Expr::array(values.into_iter().map(|w| Expr::num(f64::from(w))).collect())
}

/// `DECODE(id, kind, [ops], [program], [[pool]...], [slots], ["shard"...])`
pub fn bundle_call(names: &CodecNames, bundle: &WireBundle, id: u32) -> Expr {
    let boot = &bundle.bootstrap;
    Expr::call(
        Expr::ident(names.decode.clone()),
        vec![
            Expr::num(f64::from(id)),
            Expr::num(f64::from(kind_code(bundle.kind))),
            words(boot.ops),
            words(boot.program.iter().copied()),
            Expr::array(boot.pool.iter().map(|a| words(a.iter().copied())).collect()),
            words(boot.slots),
            Expr::array(bundle.shards.iter().map(|s| Expr::str(s.clone())).collect()),
        ],
    )
}

fn negate(expr: Expr) -> Expr {
    Expr::Unary {
        op: UnaryOp::Minus,
        arg: Box::new(expr),
    }
}

/// Literal for a number that is immune to shadowed `NaN`/`Infinity` globals
pub fn number_literal(n: f64) -> Expr {
    if n.is_nan() {
        Expr::binary(BinaryOp::Div, Expr::num(0.0), Expr::num(0.0))
    } else if n.is_infinite() {
        let one = if n > 0.0 { Expr::num(1.0) } else { negate(Expr::num(1.0)) };
        Expr::binary(BinaryOp::Div, one, Expr::num(0.0))
    } else if n.is_sign_negative() {
        negate(Expr::num(-n))
    } else {
        Expr::num(n)
    }
}

/// Literal for one constant; closures become a one-element `[source]` box
pub fn constant_literal(constant: &Constant) -> Expr {
    match constant {
        Constant::Undefined => Expr::undefined(),
        Constant::Null => Expr::Lit(Lit::Null),
        Constant::Bool(b) => Expr::Lit(Lit::Bool(*b)),
        Constant::Number(n) => number_literal(*n),
        Constant::String(s) => Expr::str(s.clone()),
        Constant::Closure(c) => Expr::array(vec![Expr::str(c.source.clone())]),
    }
}

/// Unencoded constant pool
pub fn constants_literal(consts: &[Constant]) -> Expr {
    Expr::array(consts.iter().map(constant_literal).collect())
}

/// Unencoded instruction tape
pub fn code_literal(code: &[u32]) -> Expr {
    words(code.iter().copied())
}

/// Unencoded `[mask, decode...]` opcode table
pub fn opcode_table_literal(map: &OpcodeMap) -> Expr {
    words(std::iter::once(u32::from(map.mask())).chain(map.decode_table().iter().map(|&b| u32::from(b))))
}
