//! `dpkg-deb --contents` output parsing.
//!
//! The output is `tar -tv` style:
//!
//! ```text
//! drwxr-xr-x root/root         0 2024-01-05 10:00 ./usr/bin/
//! -rwxr-xr-x root/root     10240 2024-01-05 10:00 ./usr/bin/foo
//! lrwxrwxrwx root/root         0 2024-01-05 10:00 ./usr/bin/bar -> foo
//! hrwxr-xr-x root/root         0 2024-01-05 10:00 ./usr/bin/baz link to ./usr/bin/foo
//! ```

/// Columns before the name: mode, owner, size, date, time.
const LEADING_FIELDS: usize = 5;

/// Skip `n` whitespace-separated fields and return the rest of the line,
/// which keeps any spaces inside the file name.
fn rest_after_fields(line: &str, n: usize) -> Option<&str> {
    let mut rest = line.trim_start();
    for _ in 0..n {
        let end = rest.find(char::is_whitespace)?;
        rest = rest[end..].trim_start();
    }
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

/// File names listed by `dpkg-deb --contents`, link targets stripped.
pub fn parse_contents(stdout: &str) -> Vec<String> {
    let mut files = Vec::new();
    for line in stdout.lines() {
        let line = line.trim_end();
        let mut name = match rest_after_fields(line, LEADING_FIELDS) {
            Some(n) => n,
            None => continue,
        };
        match line.trim_start().chars().next() {
            Some('l') => {
                if let Some(idx) = name.find(" -> ") {
                    name = &name[..idx];
                }
            }
            Some('h') => {
                if let Some(idx) = name.find(" link to ") {
                    name = &name[..idx];
                }
            }
            _ => {}
        }
        files.push(name.to_string());
    }
    files
}
