use reqwest::StatusCode;

/// Domain errors raised by the NLDAS2 client.
///
/// Public functions return [`anyhow::Result`]; these values can be recovered
/// with `err.downcast_ref::<Nldas2Error>()`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Nldas2Error {
    #[error("The {name} argument should be of type {expected}, e.g. {example}.")]
    InputType {
        name: String,
        expected: String,
        example: String,
    },

    #[error("Given {name} is invalid. Valid options are:\n{}", .valid.join(", "))]
    InputValue { name: String, valid: Vec<String> },

    #[error("Given {name} is out of range. Valid range is {valid}.")]
    InputRange { name: String, valid: String },

    #[error("Service returned the following error message:\n{0}")]
    Service(String),

    #[error("{0}")]
    Http(String),
}

impl Nldas2Error {
    pub(crate) fn input_type(name: &str, expected: &str, example: &str) -> Self {
        Self::InputType {
            name: name.to_string(),
            expected: expected.to_string(),
            example: example.to_string(),
        }
    }

    pub(crate) fn input_value<S: ToString>(name: &str, valid: impl IntoIterator<Item = S>) -> Self {
        Self::InputValue {
            name: name.to_string(),
            valid: valid.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    pub(crate) fn input_range(name: &str, valid: &str) -> Self {
        Self::InputRange {
            name: name.to_string(),
            valid: valid.to_string(),
        }
    }
}

/// Builds a service error from an HTML failure page.
///
/// GES DISC reports failures as an HTML document whose messages sit in
/// `<strong>` elements; their text is concatenated in document order.
pub(crate) fn service_error_from_body(body: &str) -> Nldas2Error {
    let mut msg = String::new();
    let mut rest = body;
    while let Some(open) = rest.find("<strong>") {
        let after = &rest[open + "<strong>".len()..];
        let Some(close) = after.find("</strong>") else {
            break;
        };
        msg.push_str(&after[..close]);
        rest = &after[close + "</strong>".len()..];
    }

    let msg = msg.trim();
    if msg.is_empty() {
        Nldas2Error::Service("unrecognized response from the NLDAS2 service".to_string())
    } else {
        Nldas2Error::Service(msg.to_string())
    }
}

pub(crate) fn format_http_error(status: StatusCode, url: &str, body: &str) -> Nldas2Error {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Nldas2Error::Http(format!(
            "NLDAS2 service authentication failed (HTTP {}).\n- GES DISC requires an Earthdata Login account with the \"NASA GESDISC DATA ARCHIVE\" application approved\n- Set NLDAS2_TOKEN or put `token:` in .nldas2rc with a valid Earthdata bearer token\n\nrequest: {}",
            status.as_u16(),
            url
        ));
    }

    if status == StatusCode::NOT_FOUND {
        return Nldas2Error::Http(format!(
            "NLDAS2 service endpoint not found (HTTP 404).\n- The service path may have changed, or the configured url is incorrect\n- Default url: {}\n\nrequest: {}",
            crate::config::DEFAULT_URL,
            url
        ));
    }

    let strong = match service_error_from_body(body) {
        Nldas2Error::Service(m) => m,
        other => other.to_string(),
    };
    Nldas2Error::Http(format!(
        "NLDAS2 request failed: HTTP {} for url ({})\n{}",
        status.as_u16(),
        url,
        strong
    ))
}
