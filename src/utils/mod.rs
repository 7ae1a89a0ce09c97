// Utility functions

use regex::Regex;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Safely acquire a mutex lock, recovering from poisoning by returning the guard.
/// Workflow state is always left consistent between statements, so a panic in
/// another holder does not invalidate it.
pub fn lock_mutex_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Mutex was poisoned, recovering: {}", poisoned);
            poisoned.into_inner()
        }
    }
}

/// Truncate to at most `limit` characters (not bytes), appending an ellipsis
/// when anything was cut.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}

static UNSAFE_FILENAME_CHARS: OnceLock<Regex> = OnceLock::new();

/// Replace characters that are hostile to file systems with `_`.
pub fn sanitize_file_component(component: &str) -> String {
    let re = UNSAFE_FILENAME_CHARS
        .get_or_init(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).expect("static regex"));
    re.replace_all(component.trim(), "_").into_owned()
}

/// Join a possibly-relative URL onto a base URL.
pub fn resolve_url(base: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        return url.to_string();
    }

    let base = base.trim_end_matches('/');
    if let Some(path) = url.strip_prefix('/') {
        // Absolute path: keep only scheme://host[:port] from the base
        match base.find("://") {
            Some(scheme_end) => {
                let host_start = scheme_end + 3;
                let origin_end = base[host_start..]
                    .find('/')
                    .map(|i| host_start + i)
                    .unwrap_or(base.len());
                format!("{}/{}", &base[..origin_end], path)
            }
            None => format!("{}/{}", base, path),
        }
    } else {
        format!("{}/{}", base, url)
    }
}
