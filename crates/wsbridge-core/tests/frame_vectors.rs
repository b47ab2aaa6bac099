//! Frame decoder vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use wsbridge_core::protocol::frame::{decode, Decoded};

mod vector_loader;
use vector_loader::TestVector;

const MAX_FRAME: usize = 1 << 20;

fn load(name: &str) -> TestVector {
    let s = fs::read_to_string(format!("tests/vectors/{name}")).unwrap();
    serde_json::from_str(&s).unwrap()
}

#[test]
fn frame_vectors() {
    let files = [
        "rfc_masked_text.json",
        "rfc_unmasked_text.json",
        "rfc_fragment_first.json",
        "rfc_masked_ping.json",
        "close_with_code.json",
        "ext16_header_only.json",
        "bad_opcode.json",
        "rsv_bits.json",
        "unmasked_client.json",
        "masked_server.json",
        "fragmented_ping.json",
        "oversized_ping.json",
        "length_msb.json",
    ];

    for f in files {
        let v = load(f);
        let raw = v.frame.decode();
        let res = decode(&raw, v.role(), MAX_FRAME);

        if let Some(err) = &v.expect_error {
            let e = res.expect_err("expected error");
            let name = format!("{e:?}");
            assert!(name.starts_with(&err.kind), "vector={} got={name}", v.description);
            continue;
        }

        let decoded = res.expect("expected ok decode");
        if v.need_more {
            assert_eq!(decoded, Decoded::NeedMoreData, "vector={}", v.description);
            continue;
        }

        let Decoded::Frame { frame, consumed } = decoded else {
            panic!("vector={} expected a complete frame", v.description);
        };
        let ex = v.expect.expect("missing expect block");

        assert_eq!(frame.fin, ex["fin"].as_bool().unwrap(), "vector={}", v.description);
        assert_eq!(format!("{:?}", frame.opcode), ex["opcode"].as_str().unwrap(), "vector={}", v.description);
        assert_eq!(
            hex::encode(&frame.payload),
            ex["payload_hex"].as_str().unwrap(),
            "vector={}",
            v.description
        );
        assert_eq!(consumed as u64, ex["consumed"].as_u64().unwrap(), "vector={}", v.description);
    }
}
