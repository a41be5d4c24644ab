/// Git metadata captured by the build script.
pub(crate) struct BuildInfo {
    pub commit_sha1: Option<&'static str>,
    pub git_dirty: bool,
}

impl BuildInfo {
    fn capture() -> Self {
        Self {
            commit_sha1: option_env!("VERGEN_GIT_SHA"),
            git_dirty: option_env!("VERGEN_GIT_DIRTY") == Some("true"),
        }
    }
}

pub(crate) fn build_info() -> BuildInfo {
    BuildInfo::capture()
}
