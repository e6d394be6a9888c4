//! Tests for the body-building helper functions.

use cobalt_stomp::body;
use serde::Serialize;

// =============================================================================
// Text Encoding Tests
// =============================================================================

#[test]
fn from_text_utf8() {
    assert_eq!(body::from_text("hello", "utf8"), b"hello");
}

#[test]
fn from_text_ascii_is_utf8_bytes() {
    assert_eq!(body::from_text("hello", "ascii"), b"hello");
}

#[test]
fn from_text_utf16le() {
    assert_eq!(body::from_text("hi", "utf16le"), [0x68, 0x00, 0x69, 0x00]);
}

#[test]
fn from_text_utf16le_non_ascii() {
    // U+00E9 LATIN SMALL LETTER E WITH ACUTE
    assert_eq!(body::from_text("é", "utf16le"), [0xE9, 0x00]);
}

#[test]
fn from_text_base64() {
    assert_eq!(body::from_text("hi", "base64"), b"aGk=");
}

#[test]
fn from_text_unknown_tag_falls_back_to_utf8() {
    assert_eq!(body::from_text("hello", "koi8-r"), b"hello");
}

// =============================================================================
// JSON Tests
// =============================================================================

#[test]
fn from_json_value() {
    let value = serde_json::json!({"hello": "world"});
    let bytes = body::from_json(&value).unwrap();
    assert_eq!(bytes, b"{\"hello\":\"world\"}");
    assert_eq!(bytes.len(), 17);
}

#[test]
fn from_json_struct() {
    #[derive(Serialize)]
    struct Order {
        id: u32,
        qty: u32,
    }
    let bytes = body::from_json(&Order { id: 7, qty: 2 }).unwrap();
    assert_eq!(bytes, b"{\"id\":7,\"qty\":2}");
}

#[test]
fn json_mime_constant() {
    assert_eq!(body::JSON_MIME, "text/json");
}

// =============================================================================
// Base64 Tests
// =============================================================================

#[test]
fn to_base64_binary() {
    assert_eq!(body::to_base64(&[0xff, 0x00]), b"/wA=");
}

#[test]
fn to_base64_empty() {
    assert_eq!(body::to_base64(&[]), b"");
}

// =============================================================================
// Region Copy Tests
// =============================================================================

#[test]
fn copy_region_basic() {
    assert_eq!(body::copy_region(b"hello world", 6, 5), b"world");
}

#[test]
fn copy_region_clamps_length() {
    assert_eq!(body::copy_region(b"abc", 1, 100), b"bc");
}

#[test]
fn copy_region_offset_past_end_is_empty() {
    assert!(body::copy_region(b"abc", 10, 2).is_empty());
}

#[test]
fn copy_region_length_overflow_saturates() {
    assert_eq!(body::copy_region(b"abc", 1, usize::MAX), b"bc");
}

#[test]
fn copy_region_is_a_deep_copy() {
    let source = b"abcdef".to_vec();
    let mut copy = body::copy_region(&source, 0, 3);
    copy[0] = b'z';
    assert_eq!(source[0], b'a');
}
