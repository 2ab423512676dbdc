use chrono::{NaiveDate, NaiveDateTime};

/// 日期目录格式
pub const DATE_FOLDER_FORMAT: &str = "%Y%m%d";

/// Segment timestamp embedded in file names.
pub const SEGMENT_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn date_folder_name(date: NaiveDate) -> String {
    date.format(DATE_FOLDER_FORMAT).to_string()
}

/// Parses a `YYYYMMDD` directory name. Anything that is not exactly eight
/// digits naming a real calendar date yields `None`.
pub fn parse_date_folder(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, DATE_FOLDER_FORMAT).ok()
}

pub fn segment_timestamp(now: NaiveDateTime) -> String {
    now.format(SEGMENT_TIMESTAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_folder_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(date_folder_name(date), "20240105");
        assert_eq!(parse_date_folder("20240105"), Some(date));
    }

    #[test]
    fn test_non_date_names_are_ignored() {
        assert_eq!(parse_date_folder("logs"), None);
        assert_eq!(parse_date_folder("2024015"), None);
        assert_eq!(parse_date_folder("202401050"), None);
        assert_eq!(parse_date_folder("2024-1-05"), None);
        assert_eq!(parse_date_folder("20241340"), None);
        assert_eq!(parse_date_folder("+2024010"), None);
    }

    #[test]
    fn test_segment_timestamp() {
        let now = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 4, 2)
            .unwrap();
        assert_eq!(segment_timestamp(now), "20240309_070402");
    }
}
