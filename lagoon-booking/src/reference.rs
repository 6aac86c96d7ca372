use rand::Rng;

const PREFIX: &str = "LGN";
// No I/O/0/1 so references survive being read over the phone.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const SUFFIX_LEN: usize = 4;

/// Generate a human-shareable booking reference: `LGN-{unix_ts}-{XXXX}`.
///
/// The timestamp orders references; the random suffix keeps two bookings
/// created in the same second apart. Generated before authorization and kept
/// unchanged through persistence so the processor metadata always correlates.
pub fn generate_reference() -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{PREFIX}-{timestamp}-{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn reference_shape() {
        let reference = generate_reference();
        let parts: Vec<&str> = reference.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "LGN");
        assert!(parts[1].parse::<i64>().unwrap() > 0);
        assert_eq!(parts[2].len(), SUFFIX_LEN);
        assert!(parts[2]
            .bytes()
            .all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn references_do_not_collide_within_a_second() {
        let refs: HashSet<String> = (0..200).map(|_| generate_reference()).collect();
        // 32^4 suffixes; 200 draws colliding would mean a broken generator.
        assert!(refs.len() > 195);
    }
}
