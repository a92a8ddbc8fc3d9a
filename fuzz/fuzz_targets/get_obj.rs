#![no_main]
use libfuzzer_sys::fuzz_target;

// Untrusted bytes read as a compiled schema and as a schema message.
fuzz_target!(|data: &[u8]| {
    let mut sink = Vec::new();
    let _ = packbuf::raw::dump(&mut sink, data);

    if let Some(root) = packbuf::Obj::get(data, 0).first() {
        if let Some(meta) = packbuf::meta::schema_set() {
            if let Ok(mdef) = meta.lookup_message("Schema") {
                let _ = packbuf::text::print_to_vec(&Default::default(), data, root, &mdef);
            }
        }
    }
});
