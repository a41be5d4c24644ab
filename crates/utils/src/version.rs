use std::sync::LazyLock;

use crate::build_info::build_info;

/// Defines the application version.
pub static VERSION: LazyLock<String> = LazyLock::new(|| {
    let info = build_info();
    format!(
        "{}-{}{}",
        env!("IMAGE_VERSION"),
        info.commit_sha1.unwrap_or("unknown"),
        if info.git_dirty { "-dirty" } else { "" }
    )
});
