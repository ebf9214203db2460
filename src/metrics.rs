//! Line-oriented metrics exposition of visit counts

use crate::models::RefererCount;

pub const METRIC_NAME: &str = "pixel_tracker_visits";

/// Render one sample line per (tracker, referer) group:
///
/// ```text
/// pixel_tracker_visits{tracker_id="abc",referer="http://x.com"} 3
/// ```
///
/// Lines are joined by `\n` without a trailing newline. No HELP/TYPE headers.
pub fn render_metrics(counts: &[RefererCount]) -> String {
    counts
        .iter()
        .map(|c| {
            format!(
                "{METRIC_NAME}{{tracker_id=\"{}\",referer=\"{}\"}} {}",
                escape_label_value(&c.tracker_id),
                escape_label_value(c.referer.as_deref().unwrap_or("")),
                c.count
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(tracker_id: &str, referer: Option<&str>, count: i64) -> RefererCount {
        RefererCount {
            tracker_id: tracker_id.to_string(),
            referer: referer.map(str::to_string),
            count,
        }
    }

    #[test]
    fn test_exact_line_format() {
        let out = render_metrics(&[count("abc", Some("http://x.com"), 3)]);
        assert_eq!(
            out,
            r#"pixel_tracker_visits{tracker_id="abc",referer="http://x.com"} 3"#
        );
    }

    #[test]
    fn test_lines_joined_without_trailing_newline() {
        let out = render_metrics(&[count("a", Some("r1"), 1), count("b", None, 2)]);
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], r#"pixel_tracker_visits{tracker_id="b",referer=""} 2"#);
        assert!(!out.ends_with('\n'));
    }

    #[test]
    fn test_empty_input_renders_empty_body() {
        assert_eq!(render_metrics(&[]), "");
    }

    #[test]
    fn test_label_values_are_escaped() {
        let out = render_metrics(&[count("a", Some("say \"hi\"\\\nnow"), 1)]);
        assert_eq!(
            out,
            r#"pixel_tracker_visits{tracker_id="a",referer="say \"hi\"\\\nnow"} 1"#
        );
    }
}
