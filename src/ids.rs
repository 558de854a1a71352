//! Entity identifiers.
//!
//! Two flavours: random ids for entities that only live for one run
//! (run ids, ad-hoc nodes) and content-derived ids for entities that must
//! converge when unchanged content is ingested again.

use uuid::Uuid;

const FNV32_OFFSET: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// Generate a random identifier of the form `{kind}_{hex}`.
///
/// The suffix is a v4 UUID (122 random bits from the OS generator).
///
/// # Examples
///
/// ```
/// # use repograph::ids::generate_id;
/// let a = generate_id("run");
/// let b = generate_id("run");
/// assert!(a.starts_with("run_"));
/// assert_ne!(a, b);
/// ```
pub fn generate_id(kind: &str) -> String {
    format!("{}_{}", kind, Uuid::new_v4().simple())
}

/// Generate an identifier of the form `{kind}_{hash(content)}`.
///
/// The hash is 32-bit FNV-1a rendered as eight lowercase hex digits, stable
/// across processes and platforms. Collisions are possible in a 32-bit space;
/// the `kind` prefix keeps distinct entity kinds apart.
///
/// # Examples
///
/// ```
/// # use repograph::ids::generate_deterministic_id;
/// let a = generate_deterministic_id("File", "src/main.py");
/// assert_eq!(a, generate_deterministic_id("File", "src/main.py"));
/// assert_eq!(a.len(), "File_".len() + 8);
/// ```
pub fn generate_deterministic_id(kind: &str, content: &str) -> String {
    format!("{}_{:08x}", kind, fnv1a32(content.as_bytes()))
}

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash = FNV32_OFFSET;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}
