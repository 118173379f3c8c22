//! Ordering and filtering of candidate archive volume names.
//!
//! RAR volumes use one of two mutually exclusive naming schemes: the numeric
//! scheme (`name.rar`, `name.r00`, `name.r01`, ...) or the part scheme
//! (`name.part01.rar`, `name.part02.rar`, ...). Given an unordered list of
//! candidate names, this module decides which scheme applies, discards names
//! that don't belong to it, and returns the indices of the surviving names in
//! volume order.

/// Scheme a volume name was recognised under, with its sort key.
enum Recognised {
    /// The `name.rar` / `name.r00` numeric scheme. Sort key: 0 for `.rar`,
    /// else `n + 1` for `.rNN`.
    Numeric(u32),
    /// The `name.partNN.rar` scheme. Sort key: the parsed part number.
    Part(u32),
}

fn recognise(name: &str) -> Option<Recognised> {
    let lower = name.to_lowercase();

    if let Some(stem) = lower.strip_suffix(".rar") {
        if let Some(part) = part_number(stem) {
            return Some(Recognised::Part(part));
        }
        return Some(Recognised::Numeric(0));
    }

    let ext = lower.rsplit('.').next()?;
    if ext.len() == 3 && ext.as_bytes()[0] == b'r' {
        if let Ok(n) = ext[1..].parse::<u32>() {
            return Some(Recognised::Numeric(n + 1));
        }
    }

    None
}

/// Given a name with its `.rar` suffix already stripped, checks whether it
/// ends in `.partNN` and returns the part number if so.
fn part_number(stem: &str) -> Option<u32> {
    let part_idx = stem.rfind(".part")?;
    let digits = &stem[part_idx + 5..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok()
}

/// Orders and filters a list of candidate volume names.
///
/// Returns the indices into `names` that belong to the archive, in volume
/// order (first volume first). An empty result is valid and means none of
/// the candidates looked like archive volumes.
pub fn order_volumes(names: &[impl AsRef<str>]) -> Vec<usize> {
    let recognised: Vec<(usize, Recognised)> = names
        .iter()
        .enumerate()
        .filter_map(|(i, name)| recognise(name.as_ref()).map(|r| (i, r)))
        .collect();

    let is_part_scheme = recognised
        .iter()
        .any(|(_, r)| matches!(r, Recognised::Part(_)));

    let mut filtered: Vec<(usize, u32, String)> = recognised
        .into_iter()
        .filter_map(|(i, r)| match (is_part_scheme, r) {
            (true, Recognised::Part(n)) => Some((i, n, names[i].as_ref().to_lowercase())),
            (false, Recognised::Numeric(n)) => Some((i, n, names[i].as_ref().to_lowercase())),
            _ => None,
        })
        .collect();

    filtered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.2.cmp(&b.2)));
    filtered.into_iter().map(|(i, _, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_scheme_orders_and_filters() {
        let names = ["movie.r01", "movie.rar", "readme.txt", "movie.r00"];
        let order = order_volumes(&names);
        assert_eq!(order, vec![1, 3, 0]);
    }

    #[test]
    fn part_scheme_orders_and_excludes_non_part() {
        let names = [
            "archive.part02.rar",
            "archive.part01.rar",
            "archive.r00",
            "archive.part10.rar",
        ];
        let order = order_volumes(&names);
        assert_eq!(order, vec![1, 0, 3]);
    }

    #[test]
    fn part_scheme_wins_when_mixed_with_numeric() {
        let names = ["a.rar", "a.part01.rar", "a.r00"];
        let order = order_volumes(&names);
        // Part scheme chosen: only a.part01.rar matches.
        assert_eq!(order, vec![1]);
    }

    #[test]
    fn single_volume() {
        let names = ["single.rar"];
        assert_eq!(order_volumes(&names), vec![0]);
    }

    #[test]
    fn empty_input_is_not_an_error() {
        let names: [&str; 0] = [];
        assert_eq!(order_volumes(&names), Vec::<usize>::new());
    }

    #[test]
    fn no_matching_names_yields_empty() {
        let names = ["readme.txt", "cover.jpg"];
        assert_eq!(order_volumes(&names), Vec::<usize>::new());
    }

    #[test]
    fn case_insensitive() {
        let names = ["Movie.RAR", "MOVIE.R00"];
        assert_eq!(order_volumes(&names), vec![0, 1]);
    }
}
