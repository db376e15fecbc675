use uuid::Uuid;

pub type Id = String;

/// Opaque token used for session ids.
pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// 32 lowercase hex characters, no separators.
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}
