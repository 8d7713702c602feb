/// Database row types; these map directly to SQLite rows.
/// Distinct from tally-types API models to keep the DB layer independent;
/// timestamps stay as SQLite text here and are parsed at the API boundary.

pub struct PersonalMessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub body: String,
    pub is_seen: bool,
    pub created_at: String,
}

pub struct GroupMessageRow {
    pub id: i64,
    pub group_id: i64,
    pub sender_id: i64,
    pub body: String,
    pub created_at: String,
}
