//! MIDI note helpers.

/// Note names within an octave, indexed by `key % 12`.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Key of A4, the tuning reference.
const A4_KEY: u8 = 69;

/// Frequency of A4 in Hz.
const A4_FREQUENCY: f32 = 440.0;

/// Converts a MIDI key to a note name with octave.
///
/// # Examples
///
/// ```
/// use sfplayer::midi::note_to_name;
///
/// assert_eq!(note_to_name(60), "C4");
/// assert_eq!(note_to_name(70), "A#4");
/// ```
pub fn note_to_name(key: u8) -> String {
    let octave = (key / 12) as i8 - 1;
    format!("{}{}", NOTE_NAMES[(key % 12) as usize], octave)
}

/// Parses a note name like "C4", "F#5" or "Bb3" into a MIDI key.
///
/// Returns None if the name is malformed or outside 0-127.
pub fn name_to_note(name: &str) -> Option<u8> {
    let name = name.trim();
    let octave_start = name.find(|c: char| c.is_ascii_digit() || c == '-')?;
    let (pitch, octave) = name.split_at(octave_start);
    let octave: i16 = octave.parse().ok()?;

    let mut chars = pitch.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let base = NOTE_NAMES
        .iter()
        .position(|n| n.len() == 1 && n.starts_with(letter))? as i16;
    let shift = match chars.as_str() {
        "" => 0,
        "#" => 1,
        "b" => -1,
        _ => return None,
    };

    let key = (octave + 1) * 12 + base + shift;
    u8::try_from(key).ok().filter(|k| *k <= 127)
}

/// Parses either a note name or a plain key number.
pub fn parse_key(text: &str) -> Option<u8> {
    match text.trim().parse::<u8>() {
        Ok(key) if key <= 127 => Some(key),
        Ok(_) => None,
        Err(_) => name_to_note(text),
    }
}

/// Equal-tempered frequency of a MIDI key in Hz.
pub fn key_to_frequency(key: u8) -> f32 {
    A4_FREQUENCY * 2f32.powf((key as f32 - A4_KEY as f32) / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_name() {
        assert_eq!(note_to_name(0), "C-1");
        assert_eq!(note_to_name(69), "A4");
        assert_eq!(note_to_name(127), "G9");
    }

    #[test]
    fn test_name_to_note() {
        assert_eq!(name_to_note("C4"), Some(60));
        assert_eq!(name_to_note("c4"), Some(60));
        assert_eq!(name_to_note("F#5"), Some(78));
        assert_eq!(name_to_note("Bb3"), Some(58));
        assert_eq!(name_to_note("C-1"), Some(0));
        assert_eq!(name_to_note("G9"), Some(127));
        assert_eq!(name_to_note("G#9"), None);
        assert_eq!(name_to_note("H4"), None);
        assert_eq!(name_to_note("C"), None);
        assert_eq!(name_to_note(""), None);
    }

    #[test]
    fn test_round_trip_all_keys() {
        for key in 0..=127u8 {
            assert_eq!(name_to_note(&note_to_name(key)), Some(key));
        }
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("72"), Some(72));
        assert_eq!(parse_key("200"), None);
        assert_eq!(parse_key("A4"), Some(69));
    }

    #[test]
    fn test_key_to_frequency() {
        assert!((key_to_frequency(69) - 440.0).abs() < 1e-3);
        assert!((key_to_frequency(81) - 880.0).abs() < 1e-2);
        assert!((key_to_frequency(60) - 261.63).abs() < 1e-2);
    }
}
