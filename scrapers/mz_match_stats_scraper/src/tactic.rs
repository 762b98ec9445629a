/// Number of outfield slots a formation describes.
pub const OUTFIELD_SLOTS: usize = 10;

/// Summarises the starting positions as a `"D-M-A"` formation label.
///
/// Only the defence (`De`), midfield (`Me`) and attack (`At`) codes are counted, in
/// order, until ten outfield slots are filled. The goalkeeper and any other code are
/// ignored.
pub fn infer_tactic<S: AsRef<str>>(positions: &[S]) -> String {
    let (mut defence, mut midfield, mut attack) = (0, 0, 0);
    let mut counted = 0;

    for position in positions {
        match position.as_ref() {
            "De" => defence += 1,
            "Me" => midfield += 1,
            "At" => attack += 1,
            _ => continue,
        }
        counted += 1;
        if counted == OUTFIELD_SLOTS {
            break;
        }
    }

    format!("{}-{}-{}", defence, midfield, attack)
}
