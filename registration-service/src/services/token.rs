//! Human-readable access tokens: `PREFIX-XXXX-YYYY`.
//!
//! `XXXX` comes from the registrant's registration number, `YYYY` is random.
//! Tokens are display labels, not credentials, and are not guaranteed unique.

use rand::Rng;

const SUFFIX_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SEGMENT_LEN: usize = 4;

#[derive(Clone, Debug)]
pub struct TokenGenerator {
    prefix: String,
}

impl TokenGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn generate(&self, regno: Option<&str>, participant_no: i64) -> String {
        self.generate_with(&mut rand::thread_rng(), regno, participant_no)
    }

    fn generate_with<R: Rng>(
        &self,
        rng: &mut R,
        regno: Option<&str>,
        participant_no: i64,
    ) -> String {
        format!(
            "{}-{}-{}",
            self.prefix,
            short_code(regno.unwrap_or_default(), participant_no),
            random_suffix(rng)
        )
    }
}

/// Last four alphanumerics of `regno`, uppercased. Falls back to the
/// participant number's last four digits when `regno` has none.
fn short_code(regno: &str, participant_no: i64) -> String {
    let cleaned: Vec<char> = regno
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.is_empty() {
        return format!("{:04}", participant_no.rem_euclid(10_000));
    }

    cleaned[cleaned.len().saturating_sub(SEGMENT_LEN)..]
        .iter()
        .collect()
}

fn random_suffix<R: Rng>(rng: &mut R) -> String {
    (0..SEGMENT_LEN)
        .map(|_| SUFFIX_CHARSET[rng.gen_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}
