// This module provides arena-based compilation session management using the bumpalo crate.
// CompilationSession is the hub shared by every function compiled into one JitModule: it
// owns a reference to the arena allocator, interns identifiers and backend symbol names so
// that scopes and block labels can borrow them for the session's lifetime, and gathers
// SessionStats. Statistics cover functions
// compiled and failed, basic blocks created, per-opcode instruction counts taken from each
// verified function, calls emitted, optimization runs and native bindings. All state sits
// behind RefCell so that the code generator, the registry and the demo binary can share the
// session by plain reference.

//! Arena-based compilation session management.
//!
//! All interned names are tied to the session lifetime, so symbol tables can
//! hold `&'arena str` keys without cloning.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Arena-based compilation session.
pub struct CompilationSession<'arena> {
    /// Arena allocator for interned names.
    arena: &'arena Bump,

    /// Session statistics for debugging and optimization.
    stats: RefCell<SessionStats>,

    /// String interning for efficient storage.
    interned_strings: RefCell<HashMap<String, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    /// Create a new compilation session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Record that a function was compiled and verified.
    pub fn record_function_compiled(&self, name: &str, instructions: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.functions_compiled += 1;

        if stats.largest_function_size < instructions {
            stats.largest_function_size = instructions;
            stats.largest_function_name = name.to_string();
        }
    }

    /// Record a function whose compilation was abandoned.
    pub fn record_function_failed(&self, name: &str) {
        self.stats.borrow_mut().functions_failed += 1;
        log::debug!("Compilation of {} abandoned", name);
    }

    pub fn record_block_created(&self) {
        self.stats.borrow_mut().blocks_created += 1;
    }

    /// Record one emitted instruction of the given opcode.
    pub fn record_instruction_compiled(&self, opcode: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_compiled += 1;
        *stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    /// Record a call site.
    pub fn record_call_site(&self, function_name: &str) {
        self.stats.borrow_mut().total_calls += 1;
        log::trace!("Call site recorded: {}", function_name);
    }

    pub fn record_optimization(&self) {
        self.stats.borrow_mut().optimizations_run += 1;
    }

    pub fn record_native_binding(&self) {
        self.stats.borrow_mut().native_bindings += 1;
    }

    /// Get compilation statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compilation session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of functions compiled.
    pub functions_compiled: usize,

    /// Number of functions whose compilation failed.
    pub functions_failed: usize,

    /// Basic blocks created by the code generator.
    pub blocks_created: usize,

    /// Number of instructions in verified functions.
    pub instructions_compiled: usize,

    /// Count of each instruction opcode.
    pub instruction_counts: HashMap<String, usize>,

    /// Largest function compiled, in instructions.
    pub largest_function_size: usize,

    /// Name of largest function.
    pub largest_function_name: String,

    /// Total function calls compiled.
    pub total_calls: usize,

    /// Optimization pipeline runs.
    pub optimizations_run: usize,

    /// Native trampolines bound.
    pub native_bindings: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compilation Session Statistics:")?;
        writeln!(f, "  Functions compiled: {}", self.functions_compiled)?;
        writeln!(f, "  Functions failed: {}", self.functions_failed)?;
        writeln!(f, "  Basic blocks created: {}", self.blocks_created)?;
        writeln!(f, "  Instructions compiled: {}", self.instructions_compiled)?;
        writeln!(f, "  Function calls compiled: {}", self.total_calls)?;
        writeln!(f, "  Optimizations run: {}", self.optimizations_run)?;
        writeln!(f, "  Native bindings: {}", self.native_bindings)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} instructions)",
                self.largest_function_name, self.largest_function_size
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_session_creation() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 0);
        assert_eq!(stats.instructions_compiled, 0);
        assert_eq!(stats.blocks_created, 0);
    }

    #[test]
    fn test_string_interning() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        let s1 = session.intern_str("hello");
        let s2 = session.intern_str("hello");
        let s3 = session.intern_str("world");

        assert_eq!(s1.as_ptr(), s2.as_ptr()); // Same string interned
        assert_ne!(s1.as_ptr(), s3.as_ptr()); // Different strings
    }

    #[test]
    fn test_session_statistics() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_block_created();
        session.record_block_created();
        session.record_instruction_compiled("add");
        session.record_instruction_compiled("icmp");
        session.record_instruction_compiled("add");
        session.record_call_site("fact");
        session.record_function_compiled("fact", 3);
        session.record_function_failed("broken");
        session.record_optimization();
        session.record_native_binding();

        let stats = session.stats();
        assert_eq!(stats.functions_compiled, 1);
        assert_eq!(stats.functions_failed, 1);
        assert_eq!(stats.blocks_created, 2);
        assert_eq!(stats.instructions_compiled, 3);
        assert_eq!(stats.instruction_counts["add"], 2);
        assert_eq!(stats.instruction_counts["icmp"], 1);
        assert_eq!(stats.total_calls, 1);
        assert_eq!(stats.optimizations_run, 1);
        assert_eq!(stats.native_bindings, 1);
    }

    #[test]
    fn test_statistics_display() {
        let arena = Bump::new();
        let session = CompilationSession::new(&arena);

        session.record_function_compiled("factorial", 25);
        session.record_instruction_compiled("add");
        session.record_instruction_compiled("icmp");

        let output = format!("{}", session.stats());
        assert!(output.contains("Functions compiled: 1"));
        assert!(output.contains("Instructions compiled: 2"));
        assert!(output.contains("factorial (25 instructions)"));
        assert!(output.contains("    add: 1"));
    }
}
