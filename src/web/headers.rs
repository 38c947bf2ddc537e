use axum::http;
use headers::{Header, HeaderName, HeaderValue};
use mime::Mime;

/// Typed `Accept` header carrying the parsed media ranges in order of
/// appearance. Negotiation against the supported output formats happens in
/// the image codec.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Accept(pub Vec<Mime>);

impl Header for Accept {
    fn name() -> &'static HeaderName {
        &http::header::ACCEPT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let mut ranges = Vec::new();
        for value in values {
            let list = value.to_str().map_err(|_| headers::Error::invalid())?;
            for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let mime: Mime = part.parse().map_err(|_| headers::Error::invalid())?;
                ranges.push(mime);
            }
        }
        if ranges.is_empty() {
            return Err(headers::Error::invalid());
        }
        Ok(Accept(ranges))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let joined = self
            .0
            .iter()
            .map(Mime::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&joined) {
            values.extend(std::iter::once(value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &'static str) -> Result<Accept, headers::Error> {
        let value = HeaderValue::from_static(raw);
        Accept::decode(&mut std::iter::once(&value))
    }

    #[test]
    fn decodes_a_media_range_list() {
        let accept = decode("image/png, image/jpeg;quality=90, */*").unwrap();
        assert_eq!(accept.0.len(), 3);
        assert_eq!(accept.0[0].subtype(), "png");
        assert_eq!(accept.0[1].subtype(), "jpeg");
        assert_eq!(accept.0[1].get_param("quality").unwrap(), "90");
        assert_eq!(accept.0[2], mime::STAR_STAR);
    }

    #[test]
    fn skips_empty_segments_but_rejects_garbage() {
        let accept = decode("image/jpeg,,image/png,").unwrap();
        assert_eq!(accept.0.len(), 2);
        assert!(decode("not a mime").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn encode_round_trips() {
        let accept = Accept(vec![
            "image/webp".parse().unwrap(),
            "image/jpeg".parse().unwrap(),
        ]);
        let mut values = Vec::new();
        accept.encode(&mut values);
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].to_str().unwrap(), "image/webp, image/jpeg");
    }
}
