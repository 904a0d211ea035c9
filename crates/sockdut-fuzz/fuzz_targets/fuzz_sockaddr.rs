#![no_main]
use libfuzzer_sys::fuzz_target;
use sockdut_core::sockaddr::{self, NativeAddress};

fuzz_target!(|data: &[u8]| {
    // Whatever the kernel could hand back must either encode or fail cleanly,
    // and anything that encodes must decode to the same leading bytes.
    let native = NativeAddress::from_bytes(data);
    let Ok(wire) = sockaddr::encode(&native) else {
        return;
    };
    let packed = sockaddr::decode(&wire).expect("encoded address decodes");
    let n = packed.len();
    assert_eq!(&packed.as_bytes()[..4], &native.as_bytes()[..4]);
    if n == 28 {
        assert_eq!(&packed.as_bytes()[4..n], &native.as_bytes()[4..n]);
    } else {
        assert_eq!(&packed.as_bytes()[4..8], &native.as_bytes()[4..8]);
    }
});
