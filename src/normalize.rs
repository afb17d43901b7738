use crate::record::{Gender, Status};

const FEMALE_GLYPH: char = '\u{2640}';
const MALE_GLYPH: char = '\u{2642}';

/// Map raw info-box text onto the gender vocabulary.
///
/// Glyphs win over words, and "female" must be tested before "male" since
/// the latter is a substring of the former.
pub fn normalize_gender(raw: &str) -> Gender {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return Gender::Unknown;
    }
    if s.contains(FEMALE_GLYPH) {
        Gender::Female
    } else if s.contains(MALE_GLYPH) {
        Gender::Male
    } else if s.contains("female") {
        Gender::Female
    } else if s.contains("male") {
        Gender::Male
    } else {
        Gender::Unknown
    }
}

pub fn normalize_status(raw: &str) -> Status {
    let s = raw.trim().to_lowercase();
    if s.contains("alive") {
        Status::Alive
    } else if s.contains("deceased") {
        Status::Deceased
    } else {
        Status::Unknown
    }
}
