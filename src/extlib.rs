//! Classification of external library calls.
//!
//! External declarations have no body to translate, so the collector asks
//! this oracle what a call does to the points-to world. The tables cover
//! the common C library surface; anything not listed is treated as
//! unknown and polluted with the universal pointer by the caller. An
//! unrecognized function is not an error.

/// What a recognized external function does with pointers.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExternalKind {
    /// No pointer effect at all.
    Noop,
    /// Returns a fresh memory object (`malloc` and friends).
    Alloc,
    /// Stores a fresh memory object through its first argument
    /// (`posix_memalign` style).
    AllocViaArg0,
    /// Returns one of its arguments unchanged.
    RetArg(usize),
    /// Copies memory from arg 1 to arg 0 and returns arg 0.
    Memcpy,
    /// `strtol` style: writes a pointer derived from arg 0 through the
    /// out-pointer arg 1.
    Convert,
    /// Initializes a va_list with the enclosing function's vararg area.
    VaStart,
}

impl ExternalKind {
    /// True if the call produces a fresh heap object as its result.
    pub fn allocates(self) -> bool {
        matches!(self, ExternalKind::Alloc)
    }
}

// Functions with no pointer effect: numeric, string inspection, IO and
// system calls that neither capture nor return their pointer arguments.
static NOOP_FUNCS: &[&str] = &[
    "log", "log10", "exp", "exp2", "strcmp", "strncmp", "strlen", "atoi", "atof", "atol", "atoll",
    "remove", "unlink", "rename", "memcmp", "free", "execl", "execlp", "execv", "execvp", "chmod",
    "puts", "write", "open", "close", "truncate", "chdir", "mkdir", "rmdir", "read", "pipe",
    "wait", "time", "stat", "fstat", "lstat", "fopen", "fdopen", "fflush", "feof", "fileno",
    "clearerr", "rewind", "ftell", "ferror", "fgetc", "fwrite", "fread", "ungetc", "fputc",
    "fputs", "putc", "fseek", "printf", "fprintf", "sprintf", "snprintf", "vprintf", "vfprintf",
    "vsprintf", "scanf", "fscanf", "sscanf", "modf", "putchar", "isalnum", "isalpha", "isdigit",
    "isspace", "isupper", "islower", "sin", "cos", "tan", "atan", "fabs", "pow", "floor", "ceil",
    "sqrt", "hypot", "random", "tolower", "toupper", "system", "clock", "exit", "abort",
    "gettimeofday", "rand", "srand", "memset", "va_end",
];

static ALLOC_FUNCS: &[&str] = &[
    "malloc",
    "calloc",
    "realloc",
    "valloc",
    "memalign",
    "aligned_alloc",
    "strdup",
    "strndup",
];

static ALLOC_VIA_ARG0_FUNCS: &[&str] = &["posix_memalign"];

static RET_ARG0_FUNCS: &[&str] = &[
    "fgets", "gets", "stpcpy", "strcat", "strchr", "strcpy", "strerror_r", "strncat", "strncpy",
    "strpbrk", "strptime", "strrchr", "strstr", "strtok",
];

static RET_ARG2_FUNCS: &[&str] = &["freopen"];

static MEMCPY_FUNCS: &[&str] = &["memcpy", "memmove", "memccpy", "bcopy"];

static CONVERT_FUNCS: &[&str] = &[
    "strtod", "strtof", "strtol", "strtold", "strtoll", "strtoul", "strtoull",
];

/// Classifies an external function by name. `None` means the oracle
/// refuses and the caller must pollute with the universal pointer.
pub fn classify(name: &str) -> Option<ExternalKind> {
    if name == "va_start" {
        return Some(ExternalKind::VaStart);
    }
    if ALLOC_FUNCS.contains(&name) {
        return Some(ExternalKind::Alloc);
    }
    if ALLOC_VIA_ARG0_FUNCS.contains(&name) {
        return Some(ExternalKind::AllocViaArg0);
    }
    if RET_ARG0_FUNCS.contains(&name) {
        return Some(ExternalKind::RetArg(0));
    }
    if RET_ARG2_FUNCS.contains(&name) {
        return Some(ExternalKind::RetArg(2));
    }
    if MEMCPY_FUNCS.contains(&name) {
        return Some(ExternalKind::Memcpy);
    }
    if CONVERT_FUNCS.contains(&name) {
        return Some(ExternalKind::Convert);
    }
    if NOOP_FUNCS.contains(&name) {
        return Some(ExternalKind::Noop);
    }
    None
}
