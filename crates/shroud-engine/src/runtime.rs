//! The interpreter emitted into protected programs
//!
//! One copy is inserted per output program. It mirrors the reference
//! interpreter in `shroud-vm-core`: the same opcode numbering, the same
//! try-frame phases and the same completion handling, written as compact
//! JavaScript with every helper name drawn from the run's name generator.
//!
//! | helper | role |
//! |---|---|
//! | `TABLE` | `[mask, decode...]`, literal or a decoder bundle |
//! | `LOAD` / `STORE` | global reads and writes through direct `eval`, so top-level lexical bindings resolve |
//! | `MAKE` | closure materializer; the source sees the environment record as its env parameter |
//! | `REST` | object-rest helper used by lowered destructuring |
//! | `STEP` | executes one instruction |
//! | `NEED` / `POP` | operand stack access; underflow is fatal like an invalid opcode |
//! | `RAISE` / `LEAVE` | exception routing and `return` through pending finally blocks |
//! | `RUN` / `RUN_ASYNC` | synchronous and asynchronous entry points |

use shroud_ast::printer::quote;
use shroud_ast::{Expr, print_expression};
use shroud_codec::{CodecNames, decoder_source};
use shroud_common::NameGenerator;
use shroud_vm_compiler::EnvSlots;

// ============================================================================
// Templates
// ============================================================================

const CORE_TEMPLATE: &str = r#"var @TABLE@=@TABLE_INIT@;
var @CALL@=Function.prototype.call.bind(Function.prototype.call);
var @APPLY@=Function.prototype.call.bind(Function.prototype.apply);
function @LOAD@(@NAME@,@MODE@){try{return eval(@NAME@)}catch(@ERR@){if(@MODE@===1&&@ERR@ instanceof ReferenceError)return void 0;throw @ERR@}}
function @STORE@(@NAME@,@VALUE@){eval(@NAME@+"=@VALUE@")}
function @MAKE@(@SOURCE@,@ENV@){return eval("("+@SOURCE@+")")}
function @REST@(o,x){if(o==null)throw new TypeError("Cannot destructure '"+o+"' as it is "+o+".");var r={},s=Object.keys(o),i;for(i=0;i<s.length;i++)if(x.indexOf(s[i])<0)r[s[i]]=o[s[i]];return r}
function @MACHINE@(c,k,e,t){e[@THIS_KEY@]=t;return{c:c,k:k,e:e,ip:0,st:[],tr:[],v:void 0,a:void 0,f:0}}
function @INVOKE@(f,t,st,l,n){if(typeof f!=="function")throw new TypeError(typeof f+" is not a function");switch(n){case 0:return @CALL@(f,t);case 1:return @CALL@(f,t,st[l]);case 2:return @CALL@(f,t,st[l],st[l+1]);case 3:return @CALL@(f,t,st[l],st[l+1],st[l+2])}return @APPLY@(f,t,st.slice(l,l+n))}
function @CONSTRUCT@(f,st,l,n){switch(n){case 0:return new f;case 1:return new f(st[l]);case 2:return new f(st[l],st[l+1]);case 3:return new f(st[l],st[l+1],st[l+2])}return new(Function.prototype.bind.apply(f,[null].concat(st.slice(l,l+n))))}
function @LEAVE@(s,v){var t=s.tr,f;while(t.length){f=t[t.length-1];if(f.p!==2&&f.f!==4294967295){f.p=2;f.q={t:1,v:v};s.ip=f.f;s.st.length=f.z;return 0}t.pop()}s.v=v;return 1}
function @RAISE@(s,x){var t=s.tr,f;while(t.length){f=t[t.length-1];if(f.p===0){if(f.c!==4294967295){f.p=1;f.v=x;s.ip=f.c}else if(f.f!==4294967295){f.p=2;f.q={t:0,v:x};s.ip=f.f}else{t.pop();continue}s.st.length=f.z;return}if(f.p===1&&f.f!==4294967295){f.p=2;f.q={t:0,v:x};s.ip=f.f;s.st.length=f.z;return}t.pop()}throw x}
function @NEED@(s,n){if(s.st.length<n){s.f=1;throw new Error("stack underflow at "+s.ip)}}
function @POP@(s){@NEED@(s,1);return s.st.pop()}
function @STEP@(s){var c=s.c,k=s.k,st=s.st,w=c[s.ip],x=(w^@TABLE@[0])>>>0,a,b,v,f,l,n,o,i;if(w!==(w&255)||x>31){s.f=1;throw new Error("invalid opcode "+w+" at "+s.ip)}s.ip++;switch(@TABLE@[1+x]){
case 0:st.push(k[c[s.ip++]]);break;
case 1:st.push(s.e[k[c[s.ip++]]]);break;
case 2:s.e[k[c[s.ip++]]]=@POP@(s);break;
case 3:a=k[c[s.ip++]];st.push(@LOAD@(a,c[s.ip++]));break;
case 4:@STORE@(k[c[s.ip++]],@POP@(s));break;
case 5:b=@POP@(s);a=@POP@(s);st.push(a[b]);break;
case 6:v=@POP@(s);b=@POP@(s);a=@POP@(s);a[b]=v;st.push(v);break;
case 7:b=@POP@(s);a=@POP@(s);switch(c[s.ip++]){case 0:v=a+b;break;case 1:v=a-b;break;case 2:v=a*b;break;case 3:v=a/b;break;case 4:v=a%b;break;case 5:v=Math.pow(a,b);break;case 6:v=a==b;break;case 7:v=a!=b;break;case 8:v=a===b;break;case 9:v=a!==b;break;case 10:v=a<b;break;case 11:v=a<=b;break;case 12:v=a>b;break;case 13:v=a>=b;break;case 14:v=a&b;break;case 15:v=a|b;break;case 16:v=a^b;break;case 17:v=a<<b;break;case 18:v=a>>b;break;case 19:v=a>>>b;break;case 20:v=a in b;break;case 21:v=a instanceof b;break;case 22:v=a+String(b);break;default:s.f=1;throw new Error("invalid binary operator")}st.push(v);break;
case 8:a=@POP@(s);switch(c[s.ip++]){case 0:v=-a;break;case 1:v=+a;break;case 2:v=!a;break;case 3:v=~a;break;case 4:v=typeof a;break;case 5:v=void 0;break;default:s.f=1;throw new Error("invalid unary operator")}st.push(v);break;
case 9:s.ip=c[s.ip];break;
case 10:a=c[s.ip++];if(!@POP@(s))s.ip=a;break;
case 11:a=c[s.ip++];if(@POP@(s))s.ip=a;break;
case 12:@NEED@(s,1);st.push(st[st.length-1]);break;
case 13:@POP@(s);break;
case 14:n=c[s.ip++];@NEED@(s,n+1);l=st.length-n;v=@INVOKE@(st[l-1],void 0,st,l,n);st.length=l-1;st.push(v);break;
case 15:n=c[s.ip++];@NEED@(s,n+2);l=st.length-n;o=st[l-2];f=o[st[l-1]];if(typeof f!=="function")throw new TypeError(String(st[l-1])+" is not a function");v=@INVOKE@(f,o,st,l,n);st.length=l-2;st.push(v);break;
case 16:n=c[s.ip++];@NEED@(s,n+2);l=st.length-n;v=@INVOKE@(st[l-1],st[l-2],st,l,n);st.length=l-2;st.push(v);break;
case 17:n=c[s.ip++];@NEED@(s,n+1);l=st.length-n;v=@CONSTRUCT@(st[l-1],st,l,n);st.length=l-1;st.push(v);break;
case 18:return @LEAVE@(s,@POP@(s));
case 19:throw @POP@(s);
case 20:s.tr.push({c:c[s.ip],f:c[s.ip+1],e:c[s.ip+2],z:st.length,p:0,v:void 0,q:null});s.ip+=3;break;
case 21:s.tr.pop();break;
case 22:f=s.tr[s.tr.length-1];st.push(f.v);f.v=void 0;break;
case 23:s.tr[s.tr.length-1].p=2;break;
case 24:f=s.tr.pop();if(f.q){if(f.q.t===0)throw f.q.v;return @LEAVE@(s,f.q.v)}s.ip=f.e;break;
case 25:s.a=@POP@(s);return 2;
case 26:n=c[s.ip++];@NEED@(s,n);st.push(st.splice(st.length-n,n));break;
case 27:n=c[s.ip++];@NEED@(s,2*n);o={};a=st.splice(st.length-2*n,2*n);for(i=0;i<a.length;i+=2)o[a[i]]=a[i+1];st.push(o);break;
case 28:st.push(@MAKE@(k[c[s.ip++]][0],s.e));break;
case 29:case 31:s.ip++;break;
case 30:break;
default:s.f=1;throw new Error("invalid opcode "+w)}return 0}
function @RUN@(c,k,e,t){var s=@MACHINE@(c,k,e,t),r;while(s.ip<c.length){try{r=@STEP@(s)}catch(x){if(s.f)throw x;@RAISE@(s,x);continue}if(r===1)return s.v;if(r===2)throw new Error("await in synchronous code at "+s.ip)}}
"#;

const ASYNC_TEMPLATE: &str = r#"async function @RUN_ASYNC@(c,k,e,t){var s=@MACHINE@(c,k,e,t),r;while(s.ip<c.length){try{r=@STEP@(s)}catch(x){if(s.f)throw x;@RAISE@(s,x);continue}if(r===1)return s.v;if(r===2){try{s.st.push(await s.a)}catch(x){@RAISE@(s,x)}}}}
"#;

// ============================================================================
// Names
// ============================================================================

/// Every name the runtime and the function wrappers use.
///
/// Generated once per run; all names avoid the program's own identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeNames {
    /// Environment slots shared with the compiler
    pub slots: EnvSlots,
    /// Decoder helper names
    pub codec: CodecNames,
    /// Opcode table variable
    pub table: String,
    /// Synchronous entry point
    pub run: String,
    /// Asynchronous entry point
    pub run_async: String,
    /// Wrapper local holding the tape
    pub code_var: String,
    /// Wrapper local holding the constants
    pub consts_var: String,
    /// Wrapper local holding the environment record
    pub env_var: String,
    helpers: Helpers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Helpers {
    call: String,
    apply: String,
    load: String,
    store: String,
    make: String,
    machine: String,
    invoke: String,
    construct: String,
    leave: String,
    raise: String,
    step: String,
    name: String,
    mode: String,
    err: String,
    value: String,
    source: String,
    need: String,
    pop: String,
}

impl RuntimeNames {
    /// Draw every name from `names`
    pub fn generate(names: &mut NameGenerator) -> Self {
        let slots = EnvSlots::generate(names);
        let codec = CodecNames::generate(names);
        let mut fresh = || names.fresh();
        Self {
            slots,
            codec,
            table: fresh(),
            run: fresh(),
            run_async: fresh(),
            code_var: fresh(),
            consts_var: fresh(),
            env_var: fresh(),
            helpers: Helpers {
                call: fresh(),
                apply: fresh(),
                load: fresh(),
                store: fresh(),
                make: fresh(),
                machine: fresh(),
                invoke: fresh(),
                construct: fresh(),
                leave: fresh(),
                raise: fresh(),
                step: fresh(),
                name: fresh(),
                mode: fresh(),
                err: fresh(),
                value: fresh(),
                source: fresh(),
                need: fresh(),
                pop: fresh(),
            },
        }
    }

    /// Entry point for a function
    pub fn entry(&self, is_async: bool) -> &str {
        if is_async { &self.run_async } else { &self.run }
    }

    fn substitutions<'a>(&'a self, table_init: &'a str, this_key: &'a str) -> [(&'static str, &'a str); 24] {
        let h = &self.helpers;
        [
            ("@THIS_KEY@", this_key),
            ("@TABLE@", &self.table),
            ("@RUN_ASYNC@", &self.run_async),
            ("@RUN@", &self.run),
            ("@REST@", &self.slots.rest_helper),
            ("@ENV@", &self.slots.env_param),
            ("@CALL@", &h.call),
            ("@APPLY@", &h.apply),
            ("@LOAD@", &h.load),
            ("@STORE@", &h.store),
            ("@MAKE@", &h.make),
            ("@MACHINE@", &h.machine),
            ("@INVOKE@", &h.invoke),
            ("@CONSTRUCT@", &h.construct),
            ("@LEAVE@", &h.leave),
            ("@RAISE@", &h.raise),
            ("@STEP@", &h.step),
            ("@NEED@", &h.need),
            ("@POP@", &h.pop),
            ("@NAME@", &h.name),
            ("@MODE@", &h.mode),
            ("@ERR@", &h.err),
            ("@VALUE@", &h.value),
            // last, so no later pass rewrites inside the printed initializer
            ("@TABLE_INIT@", table_init),
        ]
    }
}

/// Optional parts of an emitted runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeFeatures {
    /// Include the decoder helpers (some artifact is a bundle)
    pub decoder: bool,
    /// Include the asynchronous entry point
    pub async_entry: bool,
}

/// JavaScript source of the runtime
///
/// `table_init` initializes the `[mask, decode...]` opcode table.
pub fn runtime_source(names: &RuntimeNames, table_init: &Expr, features: RuntimeFeatures) -> String {
    let table_init = print_expression(table_init);
    let this_key = quote(&names.slots.this_slot);

    let mut out = String::new();
    if features.decoder {
        out.push_str(&decoder_source(&names.codec));
    }
    out.push_str(CORE_TEMPLATE);
    if features.async_entry {
        out.push_str(ASYNC_TEMPLATE);
    }
    let mut out = out.replace("@SOURCE@", &names.helpers.source);
    for (placeholder, value) in names.substitutions(&table_init, &this_key) {
        out = out.replace(placeholder, value);
    }
    out
}
