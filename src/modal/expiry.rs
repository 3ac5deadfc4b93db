use tracing::debug;
use url::Url;

const EXPIRY_PARAM: &str = "exp";
const PLACEHOLDER_BASE: &str = "http://localhost/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Valid,
    Expired,
}

/// Lightweight expiry gate on a media URL.
///
/// Only an `exp` query parameter (Unix seconds) at or before `now_unix` expires a link.
/// URLs without one, or that cannot be parsed at all, pass.
pub fn validate_link(url: &str, now_unix: i64, validation_disabled: bool) -> LinkStatus {
    if validation_disabled {
        return LinkStatus::Valid;
    }

    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            match Url::parse(PLACEHOLDER_BASE).and_then(|base| base.join(url)) {
                Ok(parsed) => parsed,
                Err(_) => return LinkStatus::Valid,
            }
        }
        Err(e) => {
            debug!("Unparseable media URL treated as valid: {}", e);
            return LinkStatus::Valid;
        }
    };

    let Some(exp) = parsed
        .query_pairs()
        .find(|(key, _)| key == EXPIRY_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
    else {
        return LinkStatus::Valid;
    };

    match exp.trim().parse::<f64>() {
        Ok(exp) if exp > now_unix as f64 => LinkStatus::Valid,
        _ => LinkStatus::Expired,
    }
}

/// [`validate_link`] against the current wall clock
pub fn check_link(url: &str, validation_disabled: bool) -> LinkStatus {
    validate_link(url, chrono::Utc::now().timestamp(), validation_disabled)
}
