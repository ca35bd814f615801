#![no_main]

use libfuzzer_sys::fuzz_target;
use modkit_http_sync::MediaType;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 {
        return;
    }
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(parsed) = MediaType::parse(s) else {
        return;
    };
    // Display output must parse back to the same value
    let rendered = parsed.to_string();
    let reparsed = MediaType::parse(&rendered).unwrap();
    assert_eq!(parsed, reparsed);
    assert_eq!(rendered, reparsed.to_string());
});
