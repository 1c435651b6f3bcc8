//! Object store speaking the S3 REST protocol over plain HTTP(S).
//!
//! Requests are unsigned, which suits local MinIO setups and buckets behind a
//! signing proxy. Listing uses ListObjectsV2 and follows continuation tokens.

use crate::core::error::{RatesError, Result};
use crate::providers::ObjectStore;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

pub struct S3HttpStore {
    endpoint: String,
    client: Client,
}

impl S3HttpStore {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = Client::builder().user_agent("fxcheck/0.1").build()?;
        Ok(Self::with_client(endpoint, client))
    }

    pub fn with_client(endpoint: &str, client: Client) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, bucket: &str, key: Option<&str>) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| RatesError::storage(&self.endpoint, e))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RatesError::storage(&self.endpoint, "endpoint cannot carry a path"))?;
            segments.pop_if_empty().push(bucket);
            if let Some(key) = key {
                segments.extend(key.split('/'));
            }
        }
        Ok(url)
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        token: Option<&str>,
    ) -> Result<ListPage> {
        let mut url = self.url(bucket, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("list-type", "2").append_pair("prefix", prefix);
            if let Some(token) = token {
                query.append_pair("continuation-token", token);
            }
        }

        debug!(%url, "Listing objects");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // An absent bucket holds no objects.
            return Ok(ListPage::default());
        }
        if !status.is_success() {
            return Err(RatesError::storage(
                format!("{bucket}/{prefix}"),
                format!("list returned {status}"),
            ));
        }
        let body = response.text().await?;
        Ok(ListPage::parse(&body))
    }
}

#[derive(Debug, Default, PartialEq)]
struct ListPage {
    keys: Vec<String>,
    next_token: Option<String>,
}

impl ListPage {
    fn parse(body: &str) -> Self {
        let truncated = elements(body, "IsTruncated")
            .next()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        let next_token = if truncated {
            elements(body, "NextContinuationToken").next().map(unescape)
        } else {
            None
        };
        Self {
            keys: elements(body, "Key").map(unescape).collect(),
            next_token,
        }
    }
}

/// Text content of every `<tag>...</tag>` element in `body`.
fn elements<'a>(body: &'a str, tag: &str) -> impl Iterator<Item = &'a str> + use<'a> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let mut rest = body;
    std::iter::from_fn(move || {
        let start = rest.find(&open)? + open.len();
        let len = rest[start..].find(&close)?;
        let value = &rest[start..start + len];
        rest = &rest[start + len + close.len()..];
        Some(value)
    })
}

/// Decodes the predefined XML entities and numeric character references.
/// Anything unrecognised is kept as written.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .and_then(|end| entity(&rest[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "amp" => Some('&'),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

#[async_trait]
impl ObjectStore for S3HttpStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(bucket, prefix, token.as_deref()).await?;
            keys.extend(page.keys);
            match page.next_token {
                Some(next) if token.as_deref() != Some(next.as_str()) => token = Some(next),
                _ => break,
            }
        }
        debug!(%bucket, %prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self.url(bucket, Some(key))?;
        debug!(%url, "Fetching object");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(RatesError::storage(
                format!("{bucket}/{key}"),
                format!("get returned {status}"),
            ));
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE_ONE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>rates</Name>
  <Prefix>silver/tbl/metadata/</Prefix>
  <KeyCount>2</KeyCount>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>page-2</NextContinuationToken>
  <Contents><Key>silver/tbl/metadata/00001-a.metadata.json</Key><Size>10</Size></Contents>
  <Contents><Key>silver/tbl/metadata/snap&amp;1.avro</Key><Size>10</Size></Contents>
</ListBucketResult>"#;

    const PAGE_TWO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <IsTruncated>false</IsTruncated>
  <Contents><Key>silver/tbl/metadata/00002-b.metadata.json</Key></Contents>
</ListBucketResult>"#;

    #[test]
    fn test_parse_list_page() {
        let page = ListPage::parse(PAGE_ONE);
        assert_eq!(
            page.keys,
            vec![
                "silver/tbl/metadata/00001-a.metadata.json",
                "silver/tbl/metadata/snap&1.avro"
            ]
        );
        assert_eq!(page.next_token.as_deref(), Some("page-2"));

        let page = ListPage::parse(PAGE_TWO);
        assert_eq!(page.keys.len(), 1);
        assert_eq!(page.next_token, None);
    }

    #[test]
    fn test_unescape_character_references() {
        assert_eq!(unescape("a&#x26;b&#38;c&amp;d"), "a&b&c&d");
        assert_eq!(unescape("snap&#X41;&lt;1&gt;"), "snapA<1>");
        assert_eq!(unescape("&amp;lt;"), "&lt;");
        assert_eq!(unescape("a & b&bogus;&#xZZ;&"), "a & b&bogus;&#xZZ;&");

        let page = ListPage::parse(
            "<ListBucketResult><Contents><Key>tbl/caf&#233; &#x28;1&#x29;.json</Key></Contents></ListBucketResult>",
        );
        assert_eq!(page.keys, vec!["tbl/café (1).json"]);
    }

    #[tokio::test]
    async fn test_list_follows_continuation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rates"))
            .and(query_param("list-type", "2"))
            .and(query_param_is_missing("continuation-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_ONE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rates"))
            .and(query_param("continuation-token", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE_TWO))
            .mount(&server)
            .await;

        let store = S3HttpStore::new(&server.uri()).unwrap();
        let keys = store.list("rates", "silver/tbl/metadata/").await.unwrap();

        assert_eq!(keys.len(), 3);
        assert_eq!(keys[2], "silver/tbl/metadata/00002-b.metadata.json");
    }

    #[tokio::test]
    async fn test_list_server_error_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rates"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = S3HttpStore::new(&server.uri()).unwrap();
        let err = store.list("rates", "silver/").await.unwrap_err();

        assert!(matches!(err, RatesError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_get_object_and_missing_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rates/silver/tbl/data/part-0.jsonl"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rates/silver/tbl/data/gone.jsonl"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = S3HttpStore::new(&server.uri()).unwrap();

        assert_eq!(
            store
                .get("rates", "silver/tbl/data/part-0.jsonl")
                .await
                .unwrap(),
            Some(b"{}\n".to_vec())
        );
        assert_eq!(
            store.get("rates", "silver/tbl/data/gone.jsonl").await.unwrap(),
            None
        );
    }
}
