//! Profile decoding against damaged and hostile input.
//!
//! Decoding must never panic or fail: bad tuples are skipped and every
//! well-formed tuple still lands.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use secstore::{
    EncodedProfile, ProfileCodec, PropertyCollection, PropertyDefinition, PropertyValue,
};

fn schema() -> PropertyCollection {
    PropertyCollection::from_definitions(vec![
        PropertyDefinition::string("A"),
        PropertyDefinition::string("B"),
        PropertyDefinition::binary("C"),
        PropertyDefinition::string("D").nullable(false),
    ])
    .unwrap()
}

fn raw(names: &str, strings: &str, binary: &[u8]) -> EncodedProfile {
    EncodedProfile {
        names: STANDARD.encode(names),
        string_values: STANDARD.encode(strings),
        binary_values: STANDARD.encode(binary),
    }
}

fn decode(profile: &EncodedProfile) -> (PropertyCollection, secstore::DecodeReport) {
    let mut target = schema();
    let report = ProfileCodec::new(false).decode(profile, &mut target);
    (target, report)
}

#[test]
fn good_tuples_survive_bad_neighbours() {
    let names = concat!(
        "A:S:0:3:",       // good
        "B:S:999:4:",     // offset past payload
        "C:B:0:2:",       // good
        "A:X:0:1:",       // unknown kind
        "B:S:-5:1:",      // negative offset
        "B:S:0:abc:",     // non-numeric length
        "D:S:0:-1:",      // null into non-nullable
        "Zed:S:0:1:",     // not in schema
    );
    let (target, report) = decode(&raw(names, "abc", &[9, 8]));

    assert_eq!(target.value("A"), Some(&PropertyValue::from("abc")));
    assert_eq!(target.value("C"), Some(&PropertyValue::Binary(vec![9, 8])));
    assert_eq!(target.value("B"), None);
    assert_eq!(target.value("D"), None);
    assert_eq!(report.applied, 2);
    assert_eq!(report.skipped, 5);
    assert_eq!(report.unknown, 1);
}

#[test]
fn truncated_trailing_tuple_is_skipped() {
    let (target, report) = decode(&raw("A:S:0:1:B:S:1", "xy", &[]));
    assert_eq!(target.value("A"), Some(&PropertyValue::from("x")));
    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped, 1);
}

#[test]
fn slice_inside_multibyte_char_is_skipped() {
    // "é" is two bytes; offset 1 splits it.
    let (target, report) = decode(&raw("A:S:1:1:B:S:0:2:", "é", &[]));
    assert_eq!(target.value("A"), None);
    assert_eq!(target.value("B"), Some(&PropertyValue::from("é")));
    assert_eq!(report.skipped, 1);
}

#[test]
fn length_overflow_is_skipped() {
    let names = format!("A:S:{}:{}:", u64::MAX / 2, u64::MAX / 2);
    let (_, report) = decode(&raw(&names, "abc", &[]));
    assert_eq!(report.applied, 0);
    assert_eq!(report.skipped, 1);
}

#[test]
fn undecodable_fields_read_as_empty() {
    let profile = EncodedProfile {
        names: "!!not base64!!".to_string(),
        string_values: "???".to_string(),
        binary_values: "###".to_string(),
    };
    let (target, report) = decode(&profile);
    assert_eq!(report, secstore::DecodeReport::default());
    assert!(target.iter().all(|p| p.value().is_none()));

    // Valid names but a broken string payload: slices fall outside.
    let profile = EncodedProfile {
        names: STANDARD.encode("A:S:0:3:"),
        string_values: "???".to_string(),
        binary_values: String::new(),
    };
    let (_, report) = decode(&profile);
    assert_eq!(report.skipped, 1);
}

#[test]
fn non_utf8_names_are_ignored() {
    let profile = EncodedProfile {
        names: STANDARD.encode([0xff, 0xfe, b':', b'S']),
        string_values: String::new(),
        binary_values: String::new(),
    };
    let (_, report) = decode(&profile);
    assert_eq!(report.applied, 0);
}

#[test]
fn random_garbage_never_panics() {
    let mut rng = StdRng::seed_from_u64(0x5EC5_7012);
    let alphabet: Vec<char> = "ABCDSB:-0123456789x".chars().collect();

    for _ in 0..2_000 {
        let names: String = (0..rng.gen_range(0..64))
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect();
        let strings: String = (0..rng.gen_range(0..32))
            .map(|_| char::from(rng.gen_range(b'a'..=b'z')))
            .collect();
        let binary: Vec<u8> = (0..rng.gen_range(0..32)).map(|_| rng.gen()).collect();

        let (target, report) = decode(&raw(&names, &strings, &binary));
        assert!(report.applied <= names.matches(':').count() / 4 + 1);
        assert_eq!(target.len(), 4);
    }
}

#[test]
fn random_fields_never_panic() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        let field = |rng: &mut StdRng| -> String {
            let bytes: Vec<u8> = (0..rng.gen_range(0..48)).map(|_| rng.gen()).collect();
            if rng.gen_bool(0.5) {
                STANDARD.encode(bytes)
            } else {
                String::from_utf8_lossy(&bytes).into_owned()
            }
        };
        let profile = EncodedProfile {
            names: field(&mut rng),
            string_values: field(&mut rng),
            binary_values: field(&mut rng),
        };
        let _ = decode(&profile);
    }
}
