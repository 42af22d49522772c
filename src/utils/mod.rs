pub mod time;

/// Alphabet used for generated file names, uppercase ascii only.
const ID_ALPHABET: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Random uppercase id of `len` characters.
pub fn shortid(len: usize) -> String {
    nanoid::nanoid!(len, &ID_ALPHABET)
}
