#![no_main]

use libfuzzer_sys::fuzz_target;
use switchboard_mcp::UriTemplate;

// Input is "<template>\n<uri>"; neither parsing nor matching may panic.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let (template, uri) = text.split_once('\n').unwrap_or((text, text));

    if let Ok(template) = UriTemplate::parse(template) {
        let _ = template.matches(uri);
    }
});
