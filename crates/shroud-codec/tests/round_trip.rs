//! End-to-end codec properties

use proptest::prelude::*;
use shroud_codec::{ArtifactKind, CodecError, Payload, decode, encode};
use shroud_common::ObfuscationRng;
use shroud_vm_bytecode::{ClosureSource, Constant, OpcodeMap};

fn constant() -> impl Strategy<Value = Constant> {
    prop_oneof![
        Just(Constant::Undefined),
        Just(Constant::Null),
        any::<bool>().prop_map(Constant::Bool),
        any::<i32>().prop_map(|n| Constant::Number(f64::from(n) / 8.0)),
        "\\PC{0,24}".prop_map(Constant::String),
        "[a-z ]{0,16}".prop_map(|body| Constant::Closure(ClosureSource::from_source(format!(
            "function () {{ return \"{}\"; }}",
            body
        )))),
    ]
}

proptest! {
    #[test]
    fn test_code_survives_encoding(code in prop::collection::vec(any::<u32>(), 0..300), seed in any::<u64>()) {
        let mut rng = ObfuscationRng::from_seed(seed);
        let payload = Payload::Code(code);
        let bundle = encode(&payload, &mut rng).unwrap();
        prop_assert_eq!(decode(&bundle).unwrap(), payload);
    }

    #[test]
    fn test_constants_survive_encoding(consts in prop::collection::vec(constant(), 0..40), seed in any::<u64>()) {
        let mut rng = ObfuscationRng::from_seed(seed);
        let payload = Payload::Constants(consts);
        let bundle = encode(&payload, &mut rng).unwrap();
        prop_assert_eq!(decode(&bundle).unwrap(), payload);
    }

    #[test]
    fn test_opcode_table_survives_encoding(seed in any::<u64>()) {
        let mut rng = ObfuscationRng::from_seed(seed);
        let map = OpcodeMap::from_rng(&mut rng);
        let bundle = encode(&Payload::OpcodeTable(map.clone()), &mut rng).unwrap();
        prop_assert_eq!(bundle.kind, ArtifactKind::OpcodeTable);
        prop_assert_eq!(decode(&bundle).unwrap(), Payload::OpcodeTable(map));
    }
}

#[test]
fn test_same_payload_encodes_differently_per_seed() {
    let payload = Payload::Code((0..64).collect());
    let a = encode(&payload, &mut ObfuscationRng::from_seed(1)).unwrap();
    let b = encode(&payload, &mut ObfuscationRng::from_seed(2)).unwrap();
    assert_ne!(a.shards, b.shards);
    assert_ne!(a.bootstrap, b.bootstrap);
}

#[test]
fn test_tampered_bootstrap_is_reported() {
    let mut rng = ObfuscationRng::from_seed(3);
    let mut bundle = encode(&Payload::Code(vec![1, 2, 3]), &mut rng).unwrap();
    // a word that is none of the four opcodes
    let unknown = (0..256u32).find(|w| !bundle.bootstrap.ops.contains(w)).unwrap();
    bundle.bootstrap.program[0] = unknown;
    assert!(matches!(decode(&bundle), Err(CodecError::Bootstrap { offset: 0, .. })));
}

#[test]
fn test_foreign_symbol_is_reported() {
    let mut rng = ObfuscationRng::from_seed(4);
    let mut bundle = encode(&Payload::Code(vec![7; 20]), &mut rng).unwrap();
    bundle.shards[0].replace_range(0..1, "!");
    assert!(matches!(decode(&bundle), Err(CodecError::InvalidSymbol('!'))));
}

#[test]
fn test_bundle_serializes_as_json() {
    let mut rng = ObfuscationRng::from_seed(5);
    let bundle = encode(&Payload::Code(vec![42]), &mut rng).unwrap();
    let json = serde_json::to_string(&bundle).unwrap();
    let back: shroud_codec::WireBundle = serde_json::from_str(&json).unwrap();
    assert_eq!(back, bundle);
}
