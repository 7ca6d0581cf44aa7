use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SortMode {
    Alphabetical,
    #[default]
    Natural,
}

impl SortMode {
    pub fn toggled(self) -> Self {
        match self {
            SortMode::Alphabetical => SortMode::Natural,
            SortMode::Natural => SortMode::Alphabetical,
        }
    }
}

pub fn compare(mode: SortMode, left: &str, right: &str) -> Ordering {
    match mode {
        SortMode::Alphabetical => left.to_lowercase().cmp(&right.to_lowercase()),
        SortMode::Natural => natural_key(left).cmp(&natural_key(right)),
    }
}

// digit runs sort numerically, before text runs; text compares case
// insensitive
#[derive(Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Run {
    Number(u128),
    Text(String),
}

fn natural_key(text: &str) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut buffer = String::new();
    let mut numeric = false;

    for character in text.chars() {
        if buffer.is_empty() || character.is_ascii_digit() == numeric {
            numeric = character.is_ascii_digit();
            buffer.push(character);
            continue;
        }

        runs.push(to_run(std::mem::take(&mut buffer), numeric));
        numeric = character.is_ascii_digit();
        buffer.push(character);
    }

    if !buffer.is_empty() {
        runs.push(to_run(buffer, numeric));
    }

    runs
}

fn to_run(buffer: String, numeric: bool) -> Run {
    if numeric {
        match buffer.parse::<u128>() {
            Ok(number) => Run::Number(number),
            Err(_) => Run::Text(buffer),
        }
    } else {
        Run::Text(buffer.to_lowercase())
    }
}
