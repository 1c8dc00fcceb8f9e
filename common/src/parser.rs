use chrono::NaiveDateTime;

/// length in bytes of the `YYYY-MM-DD HH.MM.SS` timestamp prefix; every byte
/// in it is ASCII so byte and char offsets coincide
const TIMESTAMP_LEN: usize = 19;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedName {
    pub time_text: String,
    pub iso: String,
    pub timestamp_ms: Option<i64>,
    pub type_text: String,
    pub declared_types: Vec<String>,
    pub author: String,
    pub theme: String,
    pub seq: Option<i64>,
}

/// decode `TIMESTAMP '-' TYPE '-' AUTHOR '-' THEME_SEQ` from a basename
/// (without extension). returns `None` when any structural rule fails --
/// the caller treats that file as untracked, not an error.
pub fn parse_filename(base: &str) -> Option<ParsedName> {
    if base.len() <= TIMESTAMP_LEN || base.as_bytes().get(TIMESTAMP_LEN) != Some(&b'-') {
        return None;
    }

    let time_text = &base[..TIMESTAMP_LEN];
    let rest = &base[TIMESTAMP_LEN + 1..];

    let parts: Vec<&str> = rest.splitn(3, '-').collect();
    if parts.len() != 3 {
        return None;
    }

    let type_text = parts[0];
    let author = parts[1];
    let theme_and_seq = parts[2];

    if type_text.is_empty() || author.is_empty() {
        return None;
    }

    let (theme, seq) = split_seq(theme_and_seq);

    let iso = normalize_iso(time_text)?;
    let timestamp_ms = parse_timestamp_ms(time_text);

    let declared_types = type_text
        .split('+')
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect();

    Some(ParsedName {
        time_text: time_text.to_owned(),
        iso,
        timestamp_ms,
        type_text: type_text.to_owned(),
        declared_types,
        author: author.to_owned(),
        theme: theme.to_owned(),
        seq,
    })
}

/// lift a trailing `_<digits>` suffix off `theme_and_seq`
fn split_seq(theme_and_seq: &str) -> (&str, Option<i64>) {
    if let Some(idx) = theme_and_seq.rfind('_') {
        let (theme, suffix) = theme_and_seq.split_at(idx);
        let digits = &suffix[1..];
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(seq) = digits.parse::<i64>() {
                return (theme, Some(seq));
            }
        }
    }
    (theme_and_seq, None)
}

/// `"YYYY-MM-DD HH.MM.SS"` -> `"YYYY-MM-DDTHH:MM:SS"`
fn normalize_iso(time_text: &str) -> Option<String> {
    let (date_part, time_part) = time_text.split_once(' ')?;
    let time_part = time_part.replace('.', ":");
    Some(format!("{date_part}T{time_part}"))
}

/// epoch milliseconds for the timestamp, or `None` if it doesn't parse as a
/// real date/time. there is no timezone information embedded in the
/// filename, so this is computed as if the timestamp were UTC -- a
/// deliberate simplification that keeps the value deterministic across
/// machines rather than depending on the server's local timezone.
fn parse_timestamp_ms(time_text: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(time_text, "%Y-%m-%d %H.%M.%S")
        .ok()
        .map(|ndt| ndt.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_canonical_example() {
        let parsed =
            parse_filename("2025-12-07 16.29.19-视频-张三-夏天的第一场雨_3").expect("should parse");

        assert_eq!(parsed.time_text, "2025-12-07 16.29.19");
        assert_eq!(parsed.iso, "2025-12-07T16:29:19");
        assert_eq!(parsed.type_text, "视频");
        assert_eq!(parsed.declared_types, vec!["视频".to_owned()]);
        assert_eq!(parsed.author, "张三");
        assert_eq!(parsed.theme, "夏天的第一场雨");
        assert_eq!(parsed.seq, Some(3));
    }

    #[test]
    fn rejects_non_dash_at_offset_19() {
        assert!(parse_filename("2025-12-07 16.29.19_not-a-dash-here").is_none());
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_filename("2025-12-07 16.29.19-onlytype").is_none());
    }

    #[test]
    fn multi_type_splits_on_plus() {
        let parsed = parse_filename("2025-12-07 16.29.19-video+album-alice-beach_1").unwrap();
        assert_eq!(
            parsed.declared_types,
            vec!["video".to_owned(), "album".to_owned()]
        );
    }

    #[test]
    fn theme_may_contain_dashes_and_no_seq_is_fine() {
        let parsed = parse_filename("2025-12-07 16.29.19-video-alice-a-long-theme-name").unwrap();
        assert_eq!(parsed.theme, "a-long-theme-name");
        assert_eq!(parsed.seq, None);
    }

    #[test]
    fn round_trips_fields() {
        let name = "2025-01-02 03.04.05-type-author-theme text_7";
        let parsed = parse_filename(name).unwrap();
        let reconstructed = format!(
            "{}-{}-{}-{}_{}",
            parsed.time_text,
            parsed.type_text,
            parsed.author,
            parsed.theme,
            parsed.seq.unwrap()
        );
        assert_eq!(reconstructed, name);
    }
}
