use rand::{Rng, seq::SliceRandom};

const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

/// Generates a random alphanumeric password of `length` characters.
///
/// The password contains at least one upper case letter, one lower case letter and one digit, as
/// Ranger's password policy demands. Lengths below three are raised to three.
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::rng();
    let mut pick = |alphabet: &[u8]| char::from(alphabet[rng.random_range(0..alphabet.len())]);

    let all: Vec<u8> = [UPPERCASE, LOWERCASE, DIGITS].concat();
    let mut characters = vec![pick(UPPERCASE), pick(LOWERCASE), pick(DIGITS)];
    characters.extend((3..length).map(|_| pick(&all)));

    characters.shuffle(&mut rand::rng());
    characters.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(12)]
    #[case(32)]
    fn has_requested_length_and_character_classes(#[case] length: usize) {
        for _ in 0..50 {
            let password = generate_password(length);

            assert_eq!(password.len(), length);
            assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn short_lengths_still_satisfy_the_policy() {
        assert_eq!(generate_password(0).len(), 3);
    }

    #[test]
    fn passwords_differ() {
        assert_ne!(generate_password(12), generate_password(12));
    }
}
