//! Marker comments and guarded probe statements.
//!
//! Markers are `/*I:ID<n>:<KIND>:<field>:...:*/`; the runtime analyzer reads
//! them back from the instrumented source. Probes print at most twice per
//! site, gated by `print_flag_<category>[<n>]`.

use crate::counters::Category;

/// `/*I:ID<n>:<KIND>:<fields>:*/`. `id` is omitted for closing markers.
pub fn marker(id: Option<u32>, kind: &str, fields: &[&str]) -> String {
    let mut out = String::from("/*I:ID");
    if let Some(id) = id {
        out.push_str(&id.to_string());
    }
    out.push(':');
    out.push_str(kind);
    out.push(':');
    for field in fields {
        out.push_str(field);
        out.push(':');
    }
    out.push_str("*/");
    out
}

/// `if (print_flag_<cat>[<id>]!=2) {printf("<format>\n",<args>);print_flag_<cat>[<id>]++;}\n`
pub fn guarded(category: Category, id: u32, format: &str, args: &[&str]) -> String {
    let args: String = args.iter().map(|a| format!(",{a}")).collect();
    format!(
        "if (print_flag_{category}[{id}]!=2) {{printf(\"{format}\\n\"{args});print_flag_{category}[{id}]++;}}\n"
    )
}

/// `/*I::*/ int print_flag_<cat>[<len>];\n`
pub fn flag_array(category: Category, len: u32) -> String {
    format!("/*I::*/ int print_flag_{category}[{len}];\n")
}

/// `/*I::*/ extern int print_flag_<cat>[<len>];\n`
pub fn extern_flag_array(category: Category, len: u32) -> String {
    format!("/*I::*/ extern int print_flag_{category}[{len}];\n")
}
