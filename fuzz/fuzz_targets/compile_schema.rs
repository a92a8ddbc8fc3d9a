#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(set) = packbuf::CompileSession::isolated().compile_str(text, "fuzz.pbs") else {
        return;
    };
    // a compiled schema must load back from its own bytes
    let bytes = set.buffer().as_bytes().to_vec();
    let reloaded = packbuf::SchemaSet::from_bytes(bytes).expect("compiled schema reloads");
    assert_eq!(reloaded.schema().messages().len(), set.schema().messages().len());
});
