//! Fixed external symbol names referenced by emitted IR.
//!
//! The lowering core declares these as externs and the Kona runtime supplies
//! them at link time. Centralizing the names keeps codegen and the runtime
//! from drifting apart; nothing else in the crate spells a runtime symbol
//! out of line.

/// External symbol names exposed by or promised to the runtime.
pub mod names {
    /// Allocate a collector-managed block for object and array payloads:
    /// `kona_gc_alloc(size: i64) -> ptr`
    pub const GC_ALLOC: &str = "kona_gc_alloc";

    /// Concatenate two strings: `kona_str_concat(a: ptr, b: ptr) -> ptr`
    pub const STR_CONCAT: &str = "kona_str_concat";

    /// Render an integer: `kona_int_to_string(v: i64) -> ptr`
    pub const INT_TO_STRING: &str = "kona_int_to_string";

    /// Render a float: `kona_f64_to_string(v: f64) -> ptr`
    pub const F64_TO_STRING: &str = "kona_f64_to_string";

    /// Render `true` or `false`: `kona_bool_to_string(v: i1) -> ptr`
    pub const BOOL_TO_STRING: &str = "kona_bool_to_string";

    /// Default rendering for an array value in string-conversion position:
    /// `kona_array_to_string(a: ptr) -> ptr`
    pub const ARRAY_TO_STRING: &str = "kona_array_to_string";

    /// Package the process argument vector as a Kona `String[]`:
    /// `kona_args_new(argc: i32, argv: ptr) -> ptr`
    pub const ARGS_NEW: &str = "kona_args_new";

    /// External name of the process-entry trampoline the linker resolves
    /// process startup against.
    pub const ENTRY: &str = "main";

    /// Reserved loader global holding the static-initializer table.
    pub const INIT_TABLE: &str = "llvm.global_ctors";
}
