fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    // Generated into OUT_DIR so the table is computed once and cached across
    // compilations instead of being re-evaluated in const context
    let out_dir = std::env::var_os("OUT_DIR").unwrap();
    let path = std::path::Path::new(&out_dir).join("hex.rs");
    let table = generate_nibble_table();
    std::fs::write(
        &path,
        format!(
            "pub const INVALID_NIBBLE: u8 = 0xff;\npub const HEX_NIBBLE: [u8; 256] = {:?};\n",
            table
        ),
    )
    .unwrap();
}

/// Maps each input byte to its hex value, or 0xff for bytes that are not
/// hexadecimal digits. Trace addresses have no fixed width, so the parser
/// consumes one nibble per byte and uses the sentinel to reject bad input
fn generate_nibble_table() -> [u8; 256] {
    let mut table = [0xffu8; 256];
    let mut b = b'0';
    while b <= b'9' {
        table[b as usize] = b - b'0';
        b += 1;
    }
    let mut b = b'a';
    while b <= b'f' {
        table[b as usize] = b - b'a' + 10;
        b += 1;
    }
    let mut b = b'A';
    while b <= b'F' {
        table[b as usize] = b - b'A' + 10;
        b += 1;
    }
    table
}
