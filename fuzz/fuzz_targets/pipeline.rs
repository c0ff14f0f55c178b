#![no_main]

use libfuzzer_sys::fuzz_target;
use x86scope::{
    analysis::{build_function_at, ir::lift_function, BuilderConfig},
    disassembler::decode_stream,
    Parser,
};

fuzz_target!(|data: &[u8]| {
    let _ = decode_stream(&mut Parser::new(data), 0x401000);

    for config in [BuilderConfig::default(), BuilderConfig::permissive()] {
        if let Ok(function) = build_function_at(data, 0x401000, 0x401000, config) {
            let _ = lift_function(&function);
        }
    }
});
