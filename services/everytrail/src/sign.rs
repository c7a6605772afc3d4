use crate::arguments::{Arguments, Value};
use crate::constants::*;
use crate::ApiContext;
use everytrail_core::hash::hex_md5;
use everytrail_core::utils::{percent_escape, percent_escape_bytes};
use everytrail_core::{Error, Result};
use log::debug;

impl ApiContext {
    /// Build the signed arguments of a call.
    ///
    /// - `api_key` is always added, and `user_id` when `authenticate` is set.
    /// - Pairs are sorted by key, `sig` is appended last.
    /// - Values are percent-escaped when `use_uri_escape` is set, raw otherwise
    ///   (for multipart fields).
    ///
    /// Authenticating requires the user id to be resolved already, see
    /// [`ApiContext::resolve_user_id`]; an
    /// [`ErrorKind::Authentication`](everytrail_core::ErrorKind::Authentication)
    /// error is returned otherwise.
    pub fn signed_arguments(
        &self,
        args: &Arguments,
        use_uri_escape: bool,
        authenticate: bool,
    ) -> Result<Vec<(String, String)>> {
        let user_id = self.user_id_for_signing(authenticate)?;
        let pairs = self.signed_values(args, user_id.as_deref())?;

        Ok(pairs
            .into_iter()
            .map(|(k, v)| {
                let v = match (use_uri_escape, &v) {
                    (true, Value::Text(s)) => percent_escape(s),
                    (true, Value::Data(bs)) => percent_escape_bytes(bs),
                    (false, v) => v.to_text().into_owned(),
                };
                (k, v)
            })
            .collect())
    }

    /// Build the signed query string of a call, like
    /// `api_key=abc&bar=2&foo=1&sig=4625167c4d7b90a955b4afb066dab94c`.
    pub fn signed_query(&self, args: &Arguments, authenticate: bool) -> Result<String> {
        let user_id = self.user_id_for_signing(authenticate)?;
        let pairs = self.signed_values(args, user_id.as_deref())?;
        Ok(join_escaped(&pairs))
    }

    fn user_id_for_signing(&self, authenticate: bool) -> Result<Option<String>> {
        if !authenticate {
            return Ok(None);
        }
        match self.user_id() {
            Some(id) => Ok(Some(id)),
            None => Err(Error::authentication(
                "authentication required: user id has not been resolved",
            )),
        }
    }

    /// Sorted pairs with their signature, values untouched.
    pub(crate) fn signed_values(
        &self,
        args: &Arguments,
        user_id: Option<&str>,
    ) -> Result<Vec<(String, Value)>> {
        if self.secret().is_empty() {
            return Err(Error::config_invalid(
                "api secret is required to sign arguments",
            ));
        }

        let mut args = args.clone();
        args.insert(ARG_API_KEY, self.key());
        if let Some(user_id) = user_id {
            args.insert(ARG_USER_ID, user_id);
        }

        let mut pairs: Vec<(String, Value)> = args
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        // Stable sort, equal keys keep their insertion order.
        pairs.sort_by(|(a, _), (b, _)| a.cmp(b));

        let signature = build_signature(self.secret(), &pairs);
        debug!(
            "signed arguments: {}",
            pairs
                .iter()
                .map(|(k, _)| k.as_str())
                .collect::<Vec<_>>()
                .join(";")
        );

        pairs.push((ARG_SIGNATURE.to_string(), Value::Text(signature)));
        Ok(pairs)
    }
}

/// Join signed pairs into `k1=v1&k2=v2`, values percent-escaped.
pub(crate) fn join_escaped(pairs: &[(String, Value)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| match v {
            Value::Text(s) => format!("{k}={}", percent_escape(s)),
            Value::Data(bs) => format!("{k}={}", percent_escape_bytes(bs)),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// `md5(secret ‖ k1 ‖ v1 ‖ k2 ‖ v2 ‖ …)` over the sorted, unescaped pairs.
fn build_signature(secret: &str, pairs: &[(String, Value)]) -> String {
    let mut content = Vec::with_capacity(
        secret.len()
            + pairs
                .iter()
                .map(|(k, v)| k.len() + v.as_bytes().len())
                .sum::<usize>(),
    );
    content.extend_from_slice(secret.as_bytes());
    for (k, v) in pairs {
        content.extend_from_slice(k.as_bytes());
        content.extend_from_slice(v.as_bytes());
    }

    hex_md5(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use everytrail_core::{Context, ErrorKind};
    use pretty_assertions::assert_eq;

    fn api() -> ApiContext {
        ApiContext::new(Context::new(), "abc", "xyz")
    }

    fn signature_of(pairs: &[(String, String)]) -> &str {
        &pairs.last().unwrap().1
    }

    #[test]
    fn test_signed_query_golden() -> Result<()> {
        let args = Arguments::new().with("foo", "1").with("bar", "2");

        let query = api().signed_query(&args, false)?;
        assert_eq!(
            query,
            "api_key=abc&bar=2&foo=1&sig=4625167c4d7b90a955b4afb066dab94c"
        );
        Ok(())
    }

    #[test]
    fn test_signed_query_with_user_id_golden() -> Result<()> {
        let api = api();
        api.set_user_id("42");
        let args = Arguments::new().with("foo", "1").with("bar", "2");

        let query = api.signed_query(&args, true)?;
        assert_eq!(
            query,
            "api_key=abc&bar=2&foo=1&user_id=42&sig=a17f14dcd957dbf439c8c60ce5772985"
        );
        Ok(())
    }

    #[test]
    fn test_signature_ignores_insertion_order() -> Result<()> {
        let a = Arguments::new()
            .with("trip_id", "1042")
            .with("limit", "20")
            .with("q", "Mont Blanc");
        let b = Arguments::new()
            .with("q", "Mont Blanc")
            .with("trip_id", "1042")
            .with("limit", "20");

        let api = api();
        assert_eq!(
            api.signed_arguments(&a, true, false)?,
            api.signed_arguments(&b, true, false)?
        );
        Ok(())
    }

    #[test]
    fn test_signature_changes_with_any_value() -> Result<()> {
        let base = Arguments::new()
            .with("foo", "1")
            .with("bar", "2")
            .with("baz", "3");
        let api = api();
        let expected = api.signed_arguments(&base, false, false)?;

        for (key, _) in base.iter() {
            let mut changed = base.clone();
            changed.insert(key, "changed");
            let pairs = api.signed_arguments(&changed, false, false)?;
            assert_ne!(
                signature_of(&pairs),
                signature_of(&expected),
                "changing {key} must change the signature"
            );
        }

        let other_secret = ApiContext::new(Context::new(), "abc", "xyz2");
        assert_ne!(
            signature_of(&other_secret.signed_arguments(&base, false, false)?),
            signature_of(&expected)
        );
        Ok(())
    }

    #[test]
    fn test_signature_uses_unescaped_values() -> Result<()> {
        let args = Arguments::new().with("q", "tom & jerry");
        let api = api();

        let escaped = api.signed_arguments(&args, true, false)?;
        let raw = api.signed_arguments(&args, false, false)?;

        assert_eq!(escaped[1], ("q".to_string(), "tom%20%26%20jerry".to_string()));
        assert_eq!(raw[1], ("q".to_string(), "tom & jerry".to_string()));
        assert_eq!(signature_of(&escaped), signature_of(&raw));
        assert_eq!(
            signature_of(&raw),
            hex_md5(b"xyzapi_keyabcqtom & jerry").as_str()
        );
        Ok(())
    }

    #[test]
    fn test_signed_query_survives_url_decoding() -> Result<()> {
        let args = Arguments::new()
            .with("title", "Rock & Roll = fun")
            .with("place", "Zürich");
        let query = api().signed_query(&args, false)?;

        let decoded: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let keys: Vec<&str> = decoded.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["api_key", "place", "title", "sig"]);
        assert_eq!(decoded[1].1, "Zürich");
        assert_eq!(decoded[2].1, "Rock & Roll = fun");
        Ok(())
    }

    #[test]
    fn test_caller_cannot_override_injected_arguments() -> Result<()> {
        let api = api();
        api.set_user_id("42");
        let args = Arguments::new()
            .with("api_key", "spoofed")
            .with("user_id", "7");

        let pairs = api.signed_arguments(&args, false, true)?;
        assert_eq!(pairs[0], ("api_key".to_string(), "abc".to_string()));
        assert_eq!(pairs[1], ("user_id".to_string(), "42".to_string()));
        Ok(())
    }

    #[test]
    fn test_authentication_requires_user_id() {
        let err = api()
            .signed_query(&Arguments::new().with("foo", "1"), true)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_missing_secret() {
        let api = ApiContext::new(Context::new(), "abc", "");
        let err = api.signed_query(&Arguments::new(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_data_values() -> Result<()> {
        let args = Arguments::new().with("blob", vec![0xffu8, b'a']);
        let api = api();

        let escaped = api.signed_arguments(&args, true, false)?;
        assert_eq!(escaped[1], ("blob".to_string(), "%FFa".to_string()));

        let mut content = b"xyzapi_keyabcblob".to_vec();
        content.extend_from_slice(&[0xff, b'a']);
        assert_eq!(signature_of(&escaped), hex_md5(&content).as_str());
        Ok(())
    }
}
