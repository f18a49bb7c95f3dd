//! Artifact serialization
//!
//! - code: every word as little-endian `u32`
//! - constants: UTF-8 text of `<tag><utf16 length>:<data>` records with tags
//!   `u` undefined, `n` null, `b` boolean, `d` number, `s` string,
//!   `f` closure source
//! - opcode table: `[mask, decode[0..32]]`

use serde::{Deserialize, Serialize};
use shroud_vm_bytecode::{ClosureSource, Constant, OP_COUNT, OpcodeMap};

use crate::error::{CodecError, CodecResult};

/// Which artifact a bundle carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Instruction tape
    Code,
    /// Constant pool
    Constants,
    /// Opcode decode table
    OpcodeTable,
}

/// A decoded artifact
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Instruction tape
    Code(Vec<u32>),
    /// Constant pool
    Constants(Vec<Constant>),
    /// Opcode mapping
    OpcodeTable(OpcodeMap),
}

impl Payload {
    /// Kind of this payload
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Payload::Code(_) => ArtifactKind::Code,
            Payload::Constants(_) => ArtifactKind::Constants,
            Payload::OpcodeTable(_) => ArtifactKind::OpcodeTable,
        }
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Code(words) => words.iter().flat_map(|w| w.to_le_bytes()).collect(),
            Payload::Constants(consts) => constants_text(consts).into_bytes(),
            Payload::OpcodeTable(map) => {
                let mut out = Vec::with_capacity(OP_COUNT + 1);
                out.push(map.mask());
                out.extend_from_slice(map.decode_table());
                out
            }
        }
    }

    /// Parse bytes produced by [`Payload::to_bytes`]
    pub fn from_bytes(kind: ArtifactKind, bytes: &[u8]) -> CodecResult<Self> {
        match kind {
            ArtifactKind::Code => {
                if bytes.len() % 4 != 0 {
                    return Err(CodecError::malformed("code length is not a multiple of four"));
                }
                let words = bytes
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                Ok(Payload::Code(words))
            }
            ArtifactKind::Constants => {
                let text = std::str::from_utf8(bytes).map_err(|e| CodecError::malformed(e.to_string()))?;
                Ok(Payload::Constants(parse_constants(text)?))
            }
            ArtifactKind::OpcodeTable => {
                let (&mask, decode) = bytes
                    .split_first()
                    .ok_or_else(|| CodecError::malformed("empty opcode table"))?;
                OpcodeMap::from_decode_table(decode, mask)
                    .map(Payload::OpcodeTable)
                    .ok_or_else(|| CodecError::malformed("opcode table is not a bijection"))
            }
        }
    }
}

fn record(out: &mut String, tag: char, data: &str) {
    out.push(tag);
    out.push_str(&data.encode_utf16().count().to_string());
    out.push(':');
    out.push_str(data);
}

/// Tagged text form of a constant pool
pub fn constants_text(consts: &[Constant]) -> String {
    let mut out = String::new();
    for constant in consts {
        match constant {
            Constant::Undefined => record(&mut out, 'u', ""),
            Constant::Null => record(&mut out, 'n', ""),
            Constant::Bool(b) => record(&mut out, 'b', if *b { "1" } else { "0" }),
            Constant::Number(n) => record(&mut out, 'd', &Constant::number_text(*n)),
            Constant::String(s) => record(&mut out, 's', s),
            Constant::Closure(c) => record(&mut out, 'f', &c.source),
        }
    }
    out
}

/// Parse the tagged text form of a constant pool
pub fn parse_constants(text: &str) -> CodecResult<Vec<Constant>> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(tag) = rest.chars().next() {
        rest = &rest[tag.len_utf8()..];
        let colon = rest
            .find(':')
            .ok_or_else(|| CodecError::malformed("record without length"))?;
        let units: usize = rest[..colon]
            .parse()
            .map_err(|_| CodecError::malformed("record length is not a number"))?;
        rest = &rest[colon + 1..];

        // lengths count UTF-16 code units
        let mut taken = 0;
        let mut end = 0;
        for c in rest.chars() {
            if taken >= units {
                break;
            }
            taken += c.len_utf16();
            end += c.len_utf8();
        }
        if taken != units {
            return Err(CodecError::malformed("record runs past the end"));
        }
        let data = &rest[..end];
        rest = &rest[end..];

        let constant = match tag {
            'u' => Constant::Undefined,
            'n' => Constant::Null,
            'b' => Constant::Bool(data == "1"),
            'd' => Constant::Number(
                Constant::parse_number_text(data).ok_or_else(|| CodecError::malformed("bad number"))?,
            ),
            's' => Constant::string(data),
            'f' => Constant::Closure(ClosureSource::from_source(data)),
            other => return Err(CodecError::malformed(format!("unknown tag {:?}", other))),
        };
        out.push(constant);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shroud_common::ObfuscationRng;

    #[test]
    fn test_constants_text_format() {
        let text = constants_text(&[
            Constant::Undefined,
            Constant::Number(f64::NAN),
            Constant::string("a:b"),
            Constant::Bool(true),
        ]);
        assert_eq!(text, "u0:d3:NaNs3:a:bb1:1");
    }

    #[test]
    fn test_constants_with_astral_text() {
        let consts = vec![
            Constant::string("😀 ok"),
            Constant::Number(-0.0),
            Constant::Closure(ClosureSource::from_source("function () { return \"é\"; }")),
            Constant::Null,
        ];
        let text = constants_text(&consts);
        assert!(text.starts_with("s5:"));
        let back = parse_constants(&text).unwrap();
        assert_eq!(back, consts);
        match back[1] {
            Constant::Number(n) => assert!(n == 0.0 && n.is_sign_negative()),
            _ => panic!("expected number"),
        }
    }

    #[test]
    fn test_opcode_table_payload() {
        let map = OpcodeMap::from_rng(&mut ObfuscationRng::from_seed(8));
        let bytes = Payload::OpcodeTable(map.clone()).to_bytes();
        assert_eq!(bytes.len(), OP_COUNT + 1);
        assert_eq!(
            Payload::from_bytes(ArtifactKind::OpcodeTable, &bytes).unwrap(),
            Payload::OpcodeTable(map)
        );
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        assert!(parse_constants("s10:short").is_err());
        assert!(parse_constants("x0:").is_err());
    }
}
