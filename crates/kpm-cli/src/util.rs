//! Shared utility functions for CLI commands

/// Format a byte size as a human-readable string
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Truncate a digest for display without slicing past its end
#[must_use]
pub fn truncate_hash(hash: &str, max_len: usize) -> &str {
    let end = hash.len().min(max_len);
    &hash[..end]
}
