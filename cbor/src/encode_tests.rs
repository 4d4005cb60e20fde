#![cfg(test)]
use super::{decode, encode};
use hex_literal::hex;

fn test_emit<T>(value: &T, expected: &[u8])
where
    T: encode::ToCbor + ?Sized,
{
    assert_eq!(encode::emit(value), expected);
}

#[test]
fn uints() {
    test_emit(&0u64, &hex!("00"));
    test_emit(&23u64, &hex!("17"));
    test_emit(&24u64, &hex!("1818"));
    test_emit(&255u64, &hex!("18ff"));
    test_emit(&256u64, &hex!("190100"));
    test_emit(&65535u64, &hex!("19ffff"));
    test_emit(&65536u64, &hex!("1a00010000"));
    test_emit(&1000000000000u64, &hex!("1b000000e8d4a51000"));
}

#[test]
fn ints() {
    test_emit(&-1i64, &hex!("20"));
    test_emit(&-10i64, &hex!("29"));
    test_emit(&-100i64, &hex!("3863"));
    test_emit(&10i64, &hex!("0a"));
}

#[test]
fn strings() {
    test_emit("", &hex!("60"));
    test_emit("IETF", &hex!("6449455446"));
}

#[test]
fn bytes() {
    test_emit(&encode::Bytes(&hex!("01020304")), &hex!("4401020304"));
    test_emit(&encode::Raw(&hex!("01020304")), &hex!("01020304"));
}

#[test]
fn arrays() {
    test_emit(&(1u64, 2u64, 3u64), &hex!("83010203"));

    assert_eq!(
        encode::emit_array(Some(3), |a| {
            a.emit(&1u64);
            a.emit_array(Some(2), |a| {
                a.emit(&2u64);
                a.emit(&3u64);
            });
            a.emit_array(Some(2), |a| {
                a.emit(&4u64);
                a.emit(&5u64);
            });
        }),
        hex!("8301820203820405")
    );

    // Indefinite array with explicit break
    assert_eq!(
        encode::emit_array(None, |a| {
            a.emit(&1u64);
            a.emit(&2u64);
        }),
        hex!("9f0102ff")
    );
}

#[test]
fn round_trip() {
    let data = encode::emit_array(Some(2), |a| {
        a.emit(&42u64);
        a.emit("hello");
    });
    decode::parse_array(&data, |a, _| {
        assert_eq!(a.parse::<u64>()?, 42);
        assert_eq!(a.parse::<String>()?, "hello");
        Ok::<_, decode::Error>(())
    })
    .unwrap();
}
