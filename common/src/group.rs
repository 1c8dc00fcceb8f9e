use sha1::{Digest, Sha1};

/// stable group id: sha1 hex of the group's identity tuple
pub fn group_id(time_text: &str, author: &str, theme: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(time_text.as_bytes());
    hasher.update(b"|");
    hasher.update(author.as_bytes());
    hasher.update(b"|");
    hasher.update(theme.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_is_a_pure_function_of_its_inputs() {
        let a = group_id("2025-12-07 16.29.19", "张三", "夏天的第一场雨");
        let b = group_id("2025-12-07 16.29.19", "张三", "夏天的第一场雨");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn group_id_differs_on_any_field_change() {
        let a = group_id("t", "author", "theme");
        let b = group_id("t", "author2", "theme");
        assert_ne!(a, b);
    }
}
