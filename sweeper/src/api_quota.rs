/// Per-user quota units Gmail grants every second.
pub const GMAIL_QUOTA_PER_SECOND: usize = 250;

/// Quota units charged by Gmail for each call this tool makes.
pub struct GmailApiQuota {
    pub messages_list: usize,
    pub messages_get: usize,
    pub messages_trash: usize,
}

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    messages_list: 5,
    messages_get: 5,
    messages_trash: 5,
};
