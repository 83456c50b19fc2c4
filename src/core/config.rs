#[derive(Debug, Clone)]
pub struct Config {
    // Buffered mutations before an automatic flush
    pub flush_threshold: usize,

    // Revision files a disk shard keeps around for readers
    pub retained_revisions: usize,

    // replace_document() jumps larger than this get a warning
    pub docid_jump_warning: u64,

    // fsync revision and checkpoint files before publishing them
    pub sync_on_flush: bool,
}

impl Config {
    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold.max(1);
        self
    }

    pub fn with_retained_revisions(mut self, revisions: usize) -> Self {
        self.retained_revisions = revisions.max(1);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            flush_threshold: 10_000,
            retained_revisions: 2,
            docid_jump_warning: 1_000_000,
            sync_on_flush: true,
        }
    }
}
