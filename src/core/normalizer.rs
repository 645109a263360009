//! Type annotation stripping for the Node strategy.
//!
//! This is ordered lexical substitution, not a TypeScript parser. Only the
//! primitive/collection annotations listed in `PRIMITIVE_TYPES` and one level
//! of generics on `GENERIC_CONTAINERS` are removed. Custom types, nested
//! generics and annotations spanning several lines are left as they are and
//! surface later as execution errors.

use lazy_static::lazy_static;
use regex::Regex;

const PRIMITIVE_TYPES: &str =
    "number|string|boolean|any|void|null|undefined|never|unknown|object";
const GENERIC_CONTAINERS: &str = "Map|Set|Array|Record|Promise";

lazy_static! {
    static ref TYPE_IMPORT: Regex = Regex::new(r"import\s+type\s+.*?;").unwrap();

    /// `: number`, `: string[]`, `: number | null`, `: boolean[][]`
    static ref PRIMITIVE_ANNOTATION: Regex = Regex::new(&format!(
        r":\s*(?:{t})\b(?:\[\])*(?:\s*\|\s*(?:{t})\b(?:\[\])*)*",
        t = PRIMITIVE_TYPES
    ))
    .unwrap();

    /// `Map<number, number>` -> `Map`
    static ref GENERIC_ARGS: Regex =
        Regex::new(&format!(r"\b({})\s*<[^>]*>", GENERIC_CONTAINERS)).unwrap();

    /// `value!.` `value!,` `value!)` `value!]`
    static ref NON_NULL_ASSERTION: Regex = Regex::new(r"!+([.,)\]])").unwrap();
}

/// Strips type-only syntax so a dynamically typed engine can run the source.
///
/// Never fails. Passes are repeated until nothing changes, so
/// `normalize(&normalize(x)) == normalize(x)` holds for every input.
pub fn normalize(source: &str) -> String {
    let mut current = source.to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(source: &str) -> String {
    let stripped = TYPE_IMPORT.replace_all(source, "");
    let stripped = PRIMITIVE_ANNOTATION.replace_all(&stripped, "");
    let stripped = GENERIC_ARGS.replace_all(&stripped, "$1");
    NON_NULL_ASSERTION.replace_all(&stripped, "$1").into_owned()
}
