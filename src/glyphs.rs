/*
 *  glyphs.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

// custom character slots programmed into the HD44780 CGRAM by the controller
pub const GLYPH_PLAY: u8 = 0;
pub const GLYPH_PAUSE: u8 = 1;
pub const GLYPH_SPEAKER: u8 = 2;
pub const GLYPH_VOLUME_LOW: u8 = 3;
pub const GLYPH_VOLUME_HIGH: u8 = 4;
pub const GLYPH_BAR: u8 = 5;
pub const GLYPH_THUMB: u8 = 6;
pub const GLYPH_NOTE: u8 = 7;

pub const SPACE: u8 = b' ';
/// Stand-in for anything the LCD character ROM can't show
pub const UNK: u8 = b'?';

/// Character code safe to push to the display; non-ASCII becomes `UNK`.
#[inline]
pub fn safe_char_code(c: char) -> u8 {
    if c.is_ascii() { c as u8 } else { UNK }
}

/// Write display-safe glyphs for `s` into `buf` starting at `start`.
///
/// `length` cells are written (defaults to the character count of `s`);
/// cells past the end of the string are padded with spaces. Anything that
/// would land beyond the end of `buf` is dropped.
pub fn write_string(buf: &mut [u8], s: &str, start: usize, length: Option<usize>) {
    let length = length.unwrap_or_else(|| s.chars().count());
    let mut chars = s.chars();
    let end = start.saturating_add(length).min(buf.len());
    if start >= end {
        return;
    }
    for cell in &mut buf[start..end] {
        *cell = chars.next().map(safe_char_code).unwrap_or(SPACE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_safe_char_code() {
        assert_eq!(safe_char_code('A'), b'A');
        assert_eq!(safe_char_code('\u{7f}'), 0x7f);
        assert_eq!(safe_char_code('é'), UNK);
        assert_eq!(safe_char_code('♪'), UNK);
    }

    #[test]
    fn test_write_string_pads_and_substitutes() {
        let mut buf = [0u8; 8];
        write_string(&mut buf, "Björk", 2, Some(6));
        assert_eq!(&buf, &[0, 0, b'B', b'j', b'?', b'r', b'k', b' ']);
    }

    #[test]
    fn test_write_string_default_length() {
        let mut buf = [b'x'; 6];
        write_string(&mut buf, "ab", 1, None);
        assert_eq!(&buf, b"xabxxx");
    }

    #[test]
    fn test_write_string_truncates_at_buffer_end() {
        let mut buf = [0u8; 4];
        write_string(&mut buf, "overflowing", 2, Some(14));
        assert_eq!(&buf, &[0, 0, b'o', b'v']);
        // start past the end is a no-op
        write_string(&mut buf, "zz", 9, None);
        assert_eq!(&buf, &[0, 0, b'o', b'v']);
    }

    proptest! {
        #[test]
        fn prop_writes_exactly_length_cells(s in "\\PC{0,24}", length in 0usize..20) {
            let mut buf = [0xAAu8; 24];
            write_string(&mut buf, &s, 2, Some(length));
            let chars: Vec<char> = s.chars().collect();
            for (i, cell) in buf.iter().enumerate() {
                if i < 2 || i >= 2 + length {
                    prop_assert_eq!(*cell, 0xAA);
                } else {
                    let expected = match chars.get(i - 2) {
                        None => SPACE,
                        Some(c) if (*c as u32) > 0x7f => UNK,
                        Some(c) => *c as u8,
                    };
                    prop_assert_eq!(*cell, expected);
                }
            }
        }
    }
}
