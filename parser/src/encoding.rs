use crate::ParseError;
use tracing::warn;

/// Field separator and encoding characters of a message.
///
/// Only the field separator drives splitting; the encoding characters are kept
/// so MSH-2 can be reported, composite values are never decomposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delimiters {
    pub field: char,
    pub encoding: String,
}

impl Default for Delimiters {
    fn default() -> Self {
        Self {
            field: '|',
            encoding: "^~\\&".to_string(),
        }
    }
}

impl Delimiters {
    /// Read the separators declared by an `MSH` segment line
    pub fn from_msh(line: &str) -> Result<Self, ParseError> {
        let mut chars = line.chars();
        let prefix: String = chars.by_ref().take(3).collect();
        if prefix != "MSH" {
            return Err(ParseError::InvalidHeader(format!(
                "expected MSH, found {:?}",
                prefix
            )));
        }

        let field = chars
            .next()
            .ok_or_else(|| ParseError::InvalidHeader("missing field separator".into()))?;
        if field.is_alphanumeric() || field.is_whitespace() {
            return Err(ParseError::InvalidHeader(format!(
                "invalid field separator {:?}",
                field
            )));
        }

        let encoding: String = chars.take_while(|c| *c != field).collect();
        if encoding.chars().count() < 4 {
            return Err(ParseError::InvalidHeader(format!(
                "expected at least 4 encoding characters, found {:?}",
                encoding
            )));
        }

        let mut seen = vec![field];
        for c in encoding.chars() {
            if c.is_alphanumeric() || c.is_whitespace() || seen.contains(&c) {
                return Err(ParseError::InvalidHeader(format!(
                    "invalid encoding characters {:?}",
                    encoding
                )));
            }
            seen.push(c);
        }

        Ok(Self { field, encoding })
    }
}

/// Pick the delimiters for a message from its first MSH segment, falling back to
/// the standard `|^~\&` set when the message has no MSH or its header is unusable.
pub fn detect_delimiters<'a, I>(segments: I) -> Delimiters
where
    I: IntoIterator<Item = &'a str>,
{
    let Some(msh) = segments.into_iter().find(|line| line.starts_with("MSH")) else {
        return Delimiters::default();
    };

    Delimiters::from_msh(msh).unwrap_or_else(|e| {
        warn!("{}; using default delimiters", e);
        Delimiters::default()
    })
}

/// Validate the leading segment id of a line. The id is three ASCII uppercase
/// letters or digits followed by the field separator or the end of the line.
pub fn segment_id<'a>(line: &'a str, delimiters: &Delimiters) -> Result<&'a str, ParseError> {
    let id = line.get(..3).unwrap_or(line);
    let well_formed = id.len() == 3
        && id
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    let terminated = line[id.len()..]
        .chars()
        .next()
        .map_or(true, |c| c == delimiters.field);

    if well_formed && terminated {
        Ok(id)
    } else {
        Err(ParseError::InvalidSegmentId(
            line.chars().take(8).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_msh_standard() {
        let d = Delimiters::from_msh("MSH|^~\\&|SysA").unwrap();
        assert_eq!(d.field, '|');
        assert_eq!(d.encoding, "^~\\&");
    }

    #[test]
    fn test_from_msh_custom_separator() {
        let d = Delimiters::from_msh("MSH#^~\\&#SysA").unwrap();
        assert_eq!(d.field, '#');
    }

    #[test]
    fn test_from_msh_rejects_short_encoding() {
        assert!(matches!(
            Delimiters::from_msh("MSH|^~|SysA"),
            Err(ParseError::InvalidHeader(_))
        ));
        assert!(Delimiters::from_msh("MSH").is_err());
        assert!(Delimiters::from_msh("MSHA^~\\&A").is_err());
    }

    #[test]
    fn test_detect_defaults_without_msh() {
        let d = detect_delimiters(["PID|||123", "PV1|1"]);
        assert_eq!(d, Delimiters::default());
    }

    #[test]
    fn test_detect_defaults_on_bad_msh() {
        let d = detect_delimiters(["MSH|^~|A", "PID|||1"]);
        assert_eq!(d, Delimiters::default());

        let d = detect_delimiters(["MSH#^~\\&#A", "PID###1"]);
        assert_eq!(d.field, '#');
    }

    #[test]
    fn test_segment_id() {
        let d = Delimiters::default();
        assert_eq!(segment_id("PID|1", &d).unwrap(), "PID");
        assert_eq!(segment_id("ZZ1", &d).unwrap(), "ZZ1");
        assert!(segment_id("pid|1", &d).is_err());
        assert!(segment_id("PIDX|1", &d).is_err());
        assert!(segment_id("P|", &d).is_err());
        assert!(segment_id("hello world", &d).is_err());
    }
}
