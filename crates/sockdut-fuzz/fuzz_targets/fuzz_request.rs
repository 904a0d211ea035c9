#![no_main]
use libfuzzer_sys::fuzz_target;
use sockdut_server::RpcRequest;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    // Parsing only; dispatching arbitrary calls would touch real descriptors.
    if let Ok(request) = RpcRequest::parse(line) {
        let again = request.to_line().expect("parsed request serializes");
        assert_eq!(RpcRequest::parse(&again).ok(), Some(request));
    }
});
