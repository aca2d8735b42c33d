//! Target assembly and machine-code listings for diagnostics.
//!
//! Both listings are produced from a clone of the function's module, so they
//! are available before and after the module was handed to the execution
//! engine. Disassembly compiles the clone to an object file, locates the
//! function's symbol with `object` and decodes its bytes with `iced-x86`.

use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};
use inkwell::module::Module;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::OptimizationLevel;
use object::{Object, ObjectSection, ObjectSymbol, SymbolKind};

use super::error::JitError;

fn target_machine(opt_level: OptimizationLevel) -> Result<TargetMachine, JitError> {
    Target::initialize_native(&InitializationConfig::default()).map_err(JitError::Llvm)?;
    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple)?;
    let cpu = TargetMachine::get_host_cpu_name().to_string();
    let features = TargetMachine::get_host_cpu_features().to_string();
    target
        .create_target_machine(
            &triple,
            &cpu,
            &features,
            opt_level,
            RelocMode::Default,
            CodeModel::Default,
        )
        .ok_or_else(|| JitError::Llvm(format!("no target machine for {}", triple)))
}

/// Assembly text for every function in `module`.
pub fn assembly(module: &Module<'_>, opt_level: OptimizationLevel) -> Result<String, JitError> {
    let machine = target_machine(opt_level)?;
    let clone = module.clone();
    let buffer = machine.write_to_memory_buffer(&clone, FileType::Assembly)?;
    Ok(String::from_utf8_lossy(buffer.as_slice()).into_owned())
}

/// Decoded machine code of `symbol`, one instruction per line.
pub fn disassemble(
    module: &Module<'_>,
    symbol: &str,
    opt_level: OptimizationLevel,
) -> Result<Vec<String>, JitError> {
    if !cfg!(target_arch = "x86_64") {
        return Err(JitError::UnsupportedTarget("disassembly".into()));
    }
    let machine = target_machine(opt_level)?;
    let clone = module.clone();
    let buffer = machine.write_to_memory_buffer(&clone, FileType::Object)?;
    let file = object::File::parse(buffer.as_slice())?;

    let sym = file
        .symbols()
        .filter(|s| s.kind() == SymbolKind::Text && s.is_definition())
        .find(|s| {
            s.name()
                .map(|n| n == symbol || n.strip_prefix('_') == Some(symbol))
                .unwrap_or(false)
        })
        .ok_or_else(|| JitError::UnknownFunction(symbol.to_string()))?;
    let section_index = sym
        .section_index()
        .ok_or_else(|| JitError::Llvm(format!("`{}` is not defined in a section", symbol)))?;
    let section = file.section_by_index(section_index)?;
    let data = section.data()?;

    let start = (sym.address() - section.address()) as usize;
    let end = match sym.size() {
        0 => data.len(),
        size => (start + size as usize).min(data.len()),
    };
    let code = data
        .get(start..end)
        .ok_or_else(|| JitError::Llvm(format!("`{}` lies outside its section", symbol)))?;

    log::debug!("Disassembling {} ({} bytes)", symbol, code.len());
    let mut decoder = Decoder::with_ip(64, code, sym.address(), DecoderOptions::NONE);
    let mut formatter = NasmFormatter::new();
    let mut instruction = Instruction::default();
    let mut text = String::new();
    let mut lines = Vec::new();
    while decoder.can_decode() {
        decoder.decode_out(&mut instruction);
        text.clear();
        formatter.format(&instruction, &mut text);
        lines.push(format!("{:08X}  {}", instruction.ip(), text));
    }
    Ok(lines)
}
