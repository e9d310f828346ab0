#![no_main]

use std::sync::OnceLock;

use habbo_protocol::crypto::diffie_hellman::decode_integer;
use habbo_protocol::crypto::rsa::RsaCrypto;
use libfuzzer_sys::fuzz_target;

const E: &str = "10001";
const N: &str = "a21f7629e753f58ce4275ca472b8b4672b890fee50ec5337160c2f5c7585b0f9c5195bc6afcf3a83ea90d9b2f261b9f4e1cc758c3d21939fe8e008a67a328c3fa37021ca3277c1ae2f4926da11afb9e341a0a5d782e1ecf3e7778f4ab34e9b864e36ae74ef330e831b3fcad604e674895290a46c0c9bfe16b24e6ecd2dd61c5d";
const D: &str = "5e67f9b42f0bda1a602577b21f47e56d8a9176e06ce921101bdb9e9cb5a6d346aefab451bfc0e9af35a181d3cd8710f543a37ef3da093a60cd07e0a1a8d8d487b09881cda6045f980af6dc11aee38ecf5a3ff2175ce0a33c757f6f415a9a910f41615ac99be5d4e542b2e87f1d0d15dedb29c0665612e6ea40d06df1be295261";

fn key() -> &'static RsaCrypto {
    static KEY: OnceLock<RsaCrypto> = OnceLock::new();
    KEY.get_or_init(|| match RsaCrypto::from_hex(E, N, Some(D)) {
        Ok(key) => key,
        Err(e) => panic!("fuzz key: {e}"),
    })
}

fuzz_target!(|data: &[u8]| {
    // Raw blocks through both unpadding paths
    let rsa = key();
    let _ = rsa.decrypt(data);
    let _ = rsa.verify(data);

    // The same bytes as the hex text a client would put on the wire
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = decode_integer(rsa, text);
    }
    let _ = decode_integer(rsa, &hex::encode(data));
});
