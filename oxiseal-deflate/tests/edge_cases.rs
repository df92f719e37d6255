//! Edge case tests for the DEFLATE codec.

use oxiseal_deflate::{deflate, inflate, inflate_sized};
use proptest::prelude::*;

#[test]
fn test_single_byte() {
    let compressed = deflate(b"A", 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), b"A");
}

#[test]
fn test_all_zeros() {
    let input = vec![0u8; 1000];
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
    assert!(compressed.len() < input.len() / 10);
}

#[test]
fn test_max_match_length() {
    let input = vec![42u8; 258 * 10];
    let compressed = deflate(&input, 9).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_class_file_like_payload() {
    let mut input = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x41];
    for i in 0..64u8 {
        input.extend_from_slice(b"java/lang/Object");
        input.push(i);
    }
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate_sized(&compressed, input.len()).unwrap(), input);
}

#[test]
fn test_far_distance() {
    let mut input: Vec<u8> = (0..40_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let head = input[..300].to_vec();
    input.extend_from_slice(&head);
    let compressed = deflate(&input, 9).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

proptest! {
    #[test]
    fn prop_any_bytes_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..4096), level in 0u8..=9) {
        let compressed = deflate(&data, level).unwrap();
        prop_assert_eq!(inflate(&compressed).unwrap(), data);
    }

    #[test]
    fn prop_low_entropy_roundtrip(data in proptest::collection::vec(0u8..4, 0..8192)) {
        let compressed = deflate(&data, 6).unwrap();
        prop_assert_eq!(inflate(&compressed).unwrap(), data);
    }
}
