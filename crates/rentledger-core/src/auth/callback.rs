use reqwest::Url;

use super::client::OtpType;

/// What an emailed auth link carries once it lands on the callback page.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackLink {
    /// Confirmation link: a token hash to verify
    Verify { token_hash: String, otp_type: OtpType },
    /// Magic link that already carries a session
    Tokens {
        access_token: String,
        refresh_token: String,
    },
}

impl CallbackLink {
    /// Parse a callback URL. Parameters may be in the query or, for implicit
    /// grant links, in the fragment.
    pub fn parse(link: &str) -> Result<Self, String> {
        let url = Url::parse(link.trim()).map_err(|e| format!("Invalid authentication link: {}", e))?;

        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if let Some(fragment) = url.fragment() {
            params.extend(fragment_pairs(fragment));
        }
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, v)| k == key && !v.is_empty())
                .map(|(_, v)| v.clone())
        };

        if let Some(description) = get("error_description") {
            return Err(description);
        }

        if let (Some(token_hash), Some(kind)) = (get("token_hash"), get("type")) {
            let otp_type = kind.parse::<OtpType>()?;
            return Ok(CallbackLink::Verify { token_hash, otp_type });
        }

        if let (Some(access_token), Some(refresh_token)) = (get("access_token"), get("refresh_token")) {
            return Ok(CallbackLink::Tokens {
                access_token,
                refresh_token,
            });
        }

        Err("Invalid authentication link".to_string())
    }
}

/// Decode `k=v&k2=v2` pairs from a URL fragment.
fn fragment_pairs(fragment: &str) -> Vec<(String, String)> {
    let mut url = match Url::parse("http://callback.invalid/") {
        Ok(url) => url,
        Err(_) => return Vec::new(),
    };
    url.set_query(Some(fragment));
    url.query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confirmation_link() {
        let link = CallbackLink::parse(
            "http://localhost:3000/auth/callback?token_hash=pkce_abc123&type=signup",
        )
        .expect("valid link");
        assert_eq!(
            link,
            CallbackLink::Verify {
                token_hash: "pkce_abc123".to_string(),
                otp_type: OtpType::Signup,
            }
        );
    }

    #[test]
    fn test_parse_magic_link_fragment() {
        let link = CallbackLink::parse(
            "http://localhost:3000/auth/callback#access_token=aaa&expires_in=3600&refresh_token=rrr&token_type=bearer&type=magiclink",
        )
        .expect("valid link");
        assert_eq!(
            link,
            CallbackLink::Tokens {
                access_token: "aaa".to_string(),
                refresh_token: "rrr".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_incomplete_links() {
        assert!(CallbackLink::parse("http://localhost:3000/auth/callback?type=signup").is_err());
        assert!(CallbackLink::parse("not a url").is_err());
        assert!(CallbackLink::parse("http://x/cb?token_hash=h&type=sms").is_err());
    }

    #[test]
    fn test_parse_relays_error_description() {
        let err = CallbackLink::parse(
            "http://localhost:3000/auth/callback#error=access_denied&error_description=Email+link+is+invalid+or+has+expired",
        )
        .unwrap_err();
        assert_eq!(err, "Email link is invalid or has expired");
    }
}
