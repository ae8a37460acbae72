//! Shell Gazetteers
//!
//! Static word lists used when classifying command arguments.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};

/// Utilities covered by the command corpus
pub static UTILITIES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "find", "xargs", "grep", "egrep", "fgrep", "ls", "rm", "cp", "mv", "wc", "chmod", "chown",
        "chgrp", "sort", "head", "tail", "tar", "du", "file", "cat", "basename", "cut", "uniq",
        "pwd", "cpio", "dirname", "tee", "rename", "rmdir", "mkdir", "less", "md5sum", "compress",
    ]
    .into_iter()
    .collect()
});

/// Flags taking a numeric argument, per utility (`""` is a bare `-N` count)
pub static NUMERIC_FLAGS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        ("grep", &["A", "B", "C"][..]),
        ("head", &["", "n"][..]),
        ("tail", &["", "n"][..]),
        ("awk", &["F"][..]),
        ("xargs", &["n", "l", "L", "P", "s"][..]),
    ])
});

/// Arguments frequent enough in the corpus to be kept literally
pub static COMMON_ARGUMENTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        ".", "/", "1", "\"*.txt\"", "./", "/home", "0", "-1", "755", "644", "/tmp", "2", "~",
        "/etc", "-60", "/usr", "foo", "'*.txt'", "$HOME", "test", "/path", "\"*.c\"", "777",
        "\"*.html\"", "+30", "+7", "\"*.php\"",
    ]
    .into_iter()
    .collect()
});

pub fn is_utility(word: &str) -> bool {
    UTILITIES.contains(word)
}

/// Whether `flag` (with its leading dash) takes a number under `utility`
pub fn is_numeric_flag(utility: &str, flag: &str) -> bool {
    let Some(name) = flag.strip_prefix('-') else {
        return false;
    };
    NUMERIC_FLAGS
        .get(utility)
        .is_some_and(|flags| flags.contains(&name))
}

pub fn is_common_argument(word: &str) -> bool {
    COMMON_ARGUMENTS.contains(word)
}
