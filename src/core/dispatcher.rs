use itertools::Itertools;

use crate::core::domain::{Capability, ExecutionResult, Language, TestCase};

/// Tag aliases accepted for each language, in registry order.
const REGISTRY: &[(&str, Language, Capability)] = &[
    ("typescript", Language::TypeScript, Capability::NativeDynamic),
    ("ts", Language::TypeScript, Capability::NativeDynamic),
    ("javascript", Language::JavaScript, Capability::NativeDynamic),
    ("js", Language::JavaScript, Capability::NativeDynamic),
    ("python", Language::Python, Capability::HostedInterpreter),
    ("python3", Language::Python, Capability::HostedInterpreter),
    ("py", Language::Python, Capability::HostedInterpreter),
    ("cpp", Language::Cpp, Capability::Unsupported),
    ("c++", Language::Cpp, Capability::Unsupported),
    ("java", Language::Java, Capability::Unsupported),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Normalize the source and run it on Node.
    Native(Language),
    /// Run the source inside the hosted interpreter.
    Hosted(Language),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Dispatch {
    Run(Strategy),
    /// No case may be attempted; the run is rejected with these entries.
    Rejected {
        results: Vec<ExecutionResult>,
        error: String,
    },
}

pub fn capability(tag: &str) -> (Option<Language>, Capability) {
    let tag = tag.trim().to_lowercase();
    REGISTRY
        .iter()
        .find(|(alias, _, _)| *alias == tag)
        .map(|(_, language, capability)| (Some(*language), *capability))
        .unwrap_or((None, Capability::Unsupported))
}

/// Picks the strategy used for every case of this run, or rejects the run.
pub fn dispatch(tag: &str, cases: &[TestCase]) -> Dispatch {
    match capability(tag) {
        (Some(language), Capability::NativeDynamic) => Dispatch::Run(Strategy::Native(language)),
        (Some(language), Capability::HostedInterpreter) => {
            Dispatch::Run(Strategy::Hosted(language))
        }
        _ => {
            let case_msg = unsupported_case_message(tag);
            Dispatch::Rejected {
                results: cases
                    .iter()
                    .map(|case| ExecutionResult::failed(case, "", case_msg.clone()))
                    .collect(),
                error: format!(
                    "Language \"{}\" is not supported. Please switch to {}.",
                    tag,
                    english_list(&supported_names(), "or")
                ),
            }
        }
    }
}

fn unsupported_case_message(tag: &str) -> String {
    format!(
        "Execution is only supported for {}. {} support requires a dedicated compile backend.",
        english_list(&supported_names(), "and"),
        capitalize(tag.trim())
    )
}

/// `["a", "b", "c"]` -> `"a, b and c"`
fn english_list(names: &[&str], conjunction: &str) -> String {
    match names.split_last() {
        None => String::new(),
        Some((last, [])) => last.to_string(),
        Some((last, rest)) => format!("{} {} {}", rest.iter().join(", "), conjunction, last),
    }
}

fn supported_names() -> Vec<&'static str> {
    REGISTRY
        .iter()
        .filter(|(_, _, capability)| *capability != Capability::Unsupported)
        .map(|(_, language, _)| display_name(*language))
        .unique()
        .collect()
}

pub fn display_name(language: Language) -> &'static str {
    match language {
        Language::TypeScript => "TypeScript",
        Language::JavaScript => "JavaScript",
        Language::Python => "Python",
        Language::Cpp => "C++",
        Language::Java => "Java",
    }
}

fn capitalize(tag: &str) -> String {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
