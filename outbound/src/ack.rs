use serde::Serialize;

/// How the remote endpoint acknowledged a delivered envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Ack {
    Success,
    Unknown { raw: String },
}

impl Ack {
    /// Never fails: anything that does not read as a success is `Unknown`.
    pub fn parse(body: &str) -> Ack {
        if body.to_lowercase().contains("success") {
            Ack::Success
        } else {
            Ack::Unknown {
                raw: body.to_string(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Ack::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse() {
        assert_eq!(Ack::parse("<Result>SUCCESS</Result>"), Ack::Success);
        assert_eq!(Ack::parse("Success"), Ack::Success);
        assert_eq!(
            Ack::parse("<Result>queued</Result>"),
            Ack::Unknown {
                raw: "<Result>queued</Result>".to_string()
            }
        );
        assert!(!Ack::parse("").is_success());
    }

    #[test]
    fn test_serialize() {
        assert_eq!(
            serde_json::to_value(Ack::Success).unwrap(),
            json!({"status": "success"})
        );
        assert_eq!(
            serde_json::to_value(Ack::parse("queued")).unwrap(),
            json!({"status": "unknown", "raw": "queued"})
        );
    }
}
