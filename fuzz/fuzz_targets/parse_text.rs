#![no_main]
use libfuzzer_sys::fuzz_target;
use packbuf::text::{self, ParseOptions, PrintOptions};

fuzz_target!(|data: &[u8]| {
    let Some(meta) = packbuf::meta::schema_set() else {
        return;
    };
    let Ok(mdef) = meta.lookup_message("MsgDef") else {
        return;
    };
    let mut buf = packbuf::Buffer::new();
    let opts = ParseOptions::default().with_max_depth(64);
    if let Ok(obj) = text::parse(&opts, &mut buf, data, &mdef) {
        assert!(!buf.has_pending());
        let printed = text::print_to_vec(&PrintOptions::default(), buf.as_bytes(), obj, &mdef)
            .expect("printing into a Vec");
        let mut again = packbuf::Buffer::new();
        let obj2 = text::parse(&opts, &mut again, &printed, &mdef).expect("printed text reparses");
        let reprinted = text::print_to_vec(&PrintOptions::default(), again.as_bytes(), obj2, &mdef)
            .expect("printing into a Vec");
        assert_eq!(printed, reprinted);
    } else {
        assert!(buf.is_empty());
    }
});
