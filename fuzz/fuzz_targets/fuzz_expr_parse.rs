#![no_main]

use libfuzzer_sys::fuzz_target;
use vireo_expr::{BindingType, parse};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    for kind in [
        BindingType::IS_PROPERTY,
        BindingType::INTERPOLATION,
        BindingType::IS_ITERATOR,
        BindingType::IS_EVENT,
    ] {
        if let Ok(expr) = parse(source, kind) {
            let _ = expr.to_string();
        }
    }
});
