//! Adapter layer: Convert AcoustID DTOs to domain hits.
//!
//! This is the ONLY place where AcoustID DTO types become domain types.
//! If the API changes its response format, only this file and dto.rs
//! need to change.

use super::dto;
use crate::resolve::traits::FingerprintHit;
use crate::resolve::OracleError;

/// Convert a lookup response into fingerprint hits, best first.
pub fn to_hits(response: dto::LookupResponse) -> Result<Vec<FingerprintHit>, OracleError> {
    if response.status != "ok" {
        let error = response.error.unwrap_or(dto::ApiError {
            code: -1,
            message: "Unknown error".to_string(),
        });
        return Err(OracleError::Api {
            status: 400,
            message: error.message,
        });
    }

    let mut hits: Vec<FingerprintHit> = response
        .results
        .into_iter()
        .flat_map(|result| {
            let score = result.score;
            result.recordings.into_iter().map(move |recording| FingerprintHit {
                score,
                recording_id: recording.id,
                title: recording.title,
                artist: recording.artists.first().map(|a| a.name.clone()),
                duration_secs: recording.duration,
                release_ids: recording.releases.into_iter().map(|r| r.id).collect(),
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording(id: &str, title: Option<&str>, releases: &[&str]) -> dto::Recording {
        dto::Recording {
            id: id.to_string(),
            title: title.map(String::from),
            duration: None,
            artists: vec![],
            releases: releases
                .iter()
                .map(|r| dto::Release {
                    id: r.to_string(),
                    title: None,
                })
                .collect(),
        }
    }

    fn response(results: Vec<dto::LookupResult>) -> dto::LookupResponse {
        dto::LookupResponse {
            status: "ok".to_string(),
            results,
            error: None,
        }
    }

    #[test]
    fn test_convert_successful_response() {
        let resp = response(vec![dto::LookupResult {
            id: "aid-1".to_string(),
            score: 0.9,
            recordings: vec![recording("mbid-1", Some("Test Song"), &["rel-1"])],
        }]);

        let hits = to_hits(resp).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].recording_id, "mbid-1");
        assert_eq!(hits[0].title.as_deref(), Some("Test Song"));
        assert_eq!(hits[0].release_ids, vec!["rel-1".to_string()]);
    }

    #[test]
    fn test_convert_error_response() {
        let resp = dto::LookupResponse {
            status: "error".to_string(),
            results: vec![],
            error: Some(dto::ApiError {
                code: 4,
                message: "invalid API key".to_string(),
            }),
        };
        assert!(matches!(to_hits(resp), Err(OracleError::Api { .. })));
    }

    #[test]
    fn test_hits_sorted_by_score_descending() {
        let resp = response(vec![
            dto::LookupResult {
                id: "low".to_string(),
                score: 0.4,
                recordings: vec![recording("rec-low", None, &[])],
            },
            dto::LookupResult {
                id: "high".to_string(),
                score: 0.95,
                recordings: vec![recording("rec-high", None, &[])],
            },
        ]);

        let hits = to_hits(resp).unwrap();
        assert_eq!(hits[0].recording_id, "rec-high");
        assert_eq!(hits[1].recording_id, "rec-low");
    }

    #[test]
    fn test_skips_results_without_recordings() {
        let resp = response(vec![dto::LookupResult {
            id: "empty".to_string(),
            score: 0.9,
            recordings: vec![],
        }]);
        assert!(to_hits(resp).unwrap().is_empty());
    }
}
