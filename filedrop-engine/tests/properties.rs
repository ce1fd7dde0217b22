//! Property-based tests for the ingest pipeline

use bytes::Bytes;
use filedrop_core::{Outcome, ProgressObservation};
use filedrop_engine::*;
use futures::stream;
use proptest::prelude::*;
use std::sync::Arc;

const BOUNDARY: &str = "prop-boundary-7f3a";

fn body_with(length: Option<&str>, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(length) = length {
        let part = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"length\"\r\n\r\n{}\r\n",
            BOUNDARY, length
        );
        body.extend_from_slice(part.as_bytes());
    }
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"prop.bin\"\r\n\r\n",
            BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn length_field() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("-5".to_string())),
        Just(Some("not-a-number".to_string())),
        Just(Some("declared".to_string())),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn props_upload_is_byte_exact_and_progress_monotonic(
        payload in prop::collection::vec(any::<u8>(), 0..20000),
        chunk_size in 1usize..4096,
        length in length_field(),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let temp = tempfile::tempdir().unwrap();
            let (observer, mut rx) = ChannelObserver::new();
            let registry = ProgressRegistry::new(Arc::new(observer));
            let ingestor = Ingestor::new(IngestConfig::new(temp.path()), registry);

            let declared = payload.len().to_string();
            let length = length.map(|l| if l == "declared" { declared.clone() } else { l });
            let body = body_with(length.as_deref(), &payload);
            let chunks: Vec<Result<Bytes, std::io::Error>> =
                body.chunks(chunk_size).map(|c| Ok(Bytes::copy_from_slice(c))).collect();

            let outcome = ingestor.ingest_multipart(stream::iter(chunks), BOUNDARY).await;
            assert_eq!(outcome, Outcome::Completed(payload.len() as u64));
            assert_eq!(std::fs::read(temp.path().join("prop.bin")).unwrap(), payload);

            let observed: Vec<ProgressObservation> = std::iter::from_fn(|| rx.try_recv().ok())
                .filter_map(|e| match e {
                    ProgressEvent::Progress { observation, .. } => Some(observation),
                    _ => None,
                })
                .collect();

            assert!(observed.windows(2).all(|w| w[0].bytes_written <= w[1].bytes_written));
            for obs in &observed {
                if let Some(total) = obs.total {
                    assert!(obs.bytes_written <= total);
                }
            }
            if !payload.is_empty() {
                assert_eq!(observed.last().unwrap().bytes_written, payload.len() as u64);
            }
            let expect_total = length.as_deref() == Some(declared.as_str());
            assert!(observed.iter().all(|o| o.total.is_some() == expect_total));
        });
    }

    #[test]
    fn props_length_parse_accepts_exactly_u64(value in any::<i64>()) {
        let text = value.to_string();
        match parse_length(text.as_bytes()) {
            Ok(n) => prop_assert_eq!(n as i64, value),
            Err(LengthError::Negative(_)) => prop_assert!(value < 0),
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}
