#![no_main]

use libfuzzer_sys::fuzz_target;
use modkit_http_sync::RequestBody;
use modkit_http_sync::body::MultipartBody;

fuzz_target!(|data: &[u8]| {
    if data.len() > 4096 {
        return;
    }
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let mut builder = MultipartBody::form_data();
    for (i, field) in s.split('\n').enumerate() {
        let (name, value) = field.split_once('=').unwrap_or((field, ""));
        builder = builder.text(&format!("{name}{i}"), value);
    }
    let body = builder.build().unwrap();

    // the announced length must match what goes on the wire
    let mut wire = Vec::new();
    body.write(&mut wire).unwrap();
    assert_eq!(body.length(), Some(wire.len() as u64));
});
