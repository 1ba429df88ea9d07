//! Byte-similarity fallback comparator.
//!
//! Used when the inference backend is unavailable or fails mid-call: instead
//! of failing the request, compare the encoded payloads directly. A stopgap
//! for deployments without the ONNX models installed — far weaker than
//! embedding comparison, so every match it produces is flagged as
//! fallback-sourced and should be treated as lower-confidence.

/// Payloads whose lengths differ by more than this fraction of the stored
/// length cannot be the same capture.
const LENGTH_RATIO_LIMIT: f32 = 0.3;

/// Number of leading bytes sampled for the match-rate comparison.
const SAMPLE_LEN: usize = 100;

/// Sampled-byte match rate required for a fallback match.
pub const MATCH_THRESHOLD: f32 = 0.8;

/// Minimum payload size for the coarse presence heuristic; anything smaller
/// cannot be a real camera capture.
const MIN_PRESENCE_LEN: usize = 100;

/// Sampled-byte similarity between two encoded payloads.
///
/// Returns `None` when the length-ratio gate rules the pair out entirely,
/// otherwise the fraction of equal bytes over the first [`SAMPLE_LEN`] bytes.
pub fn byte_similarity(stored: &[u8], candidate: &[u8]) -> Option<f32> {
    if stored.is_empty() || candidate.is_empty() {
        return None;
    }
    let diff = stored.len().abs_diff(candidate.len());
    if diff as f32 > stored.len() as f32 * LENGTH_RATIO_LIMIT {
        return None;
    }

    let n = SAMPLE_LEN.min(stored.len()).min(candidate.len());
    let matches = stored[..n]
        .iter()
        .zip(&candidate[..n])
        .filter(|(a, b)| a == b)
        .count();
    Some(matches as f32 / n as f32)
}

/// Whether two encoded payloads match under the fallback heuristic.
pub fn bytes_match(stored: &[u8], candidate: &[u8]) -> bool {
    byte_similarity(stored, candidate).is_some_and(|s| s >= MATCH_THRESHOLD)
}

/// Coarse presence heuristic for when the detector cannot run: a payload
/// large enough to be a real capture is presumed to contain a face.
pub fn presumed_face_present(payload: &[u8]) -> bool {
    payload.len() > MIN_PRESENCE_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_payloads_match() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(400).collect();
        let sim = byte_similarity(&payload, &payload).unwrap();
        assert_eq!(sim, 1.0);
        assert!(bytes_match(&payload, &payload));
    }

    #[test]
    fn test_mostly_different_payloads_rejected() {
        // Under 50% of sampled bytes shared.
        let stored = vec![0u8; 400];
        let mut candidate = vec![1u8; 400];
        for i in (0..SAMPLE_LEN).step_by(3) {
            candidate[i] = 0; // ~33% agreement
        }
        let sim = byte_similarity(&stored, &candidate).unwrap();
        assert!(sim < 0.5, "similarity {sim}");
        assert!(!bytes_match(&stored, &candidate));
    }

    #[test]
    fn test_length_gate() {
        let stored = vec![7u8; 1000];
        let candidate = vec![7u8; 500]; // 50% shorter, over the 30% limit
        assert_eq!(byte_similarity(&stored, &candidate), None);
        assert!(!bytes_match(&stored, &candidate));
    }

    #[test]
    fn test_length_gate_boundary() {
        let stored = vec![7u8; 1000];
        let candidate = vec![7u8; 701]; // within 30%
        assert!(byte_similarity(&stored, &candidate).is_some());
    }

    #[test]
    fn test_empty_payloads() {
        assert_eq!(byte_similarity(&[], &[1, 2, 3]), None);
        assert_eq!(byte_similarity(&[1, 2, 3], &[]), None);
    }

    #[test]
    fn test_short_payloads_use_available_bytes() {
        let a = [1u8, 2, 3, 4];
        let b = [1u8, 2, 3, 9];
        let sim = byte_similarity(&a, &b).unwrap();
        assert!((sim - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_boundary() {
        // Exactly 80 of 100 sampled bytes equal.
        let stored = vec![5u8; 200];
        let mut candidate = vec![5u8; 200];
        for b in candidate.iter_mut().take(20) {
            *b = 6;
        }
        let sim = byte_similarity(&stored, &candidate).unwrap();
        assert!((sim - 0.8).abs() < 1e-6);
        assert!(bytes_match(&stored, &candidate));
    }

    #[test]
    fn test_presence_heuristic() {
        assert!(!presumed_face_present(&[0u8; 50]));
        assert!(presumed_face_present(&[0u8; 5000]));
    }
}
