/*
 * Created on Fri Jun 25 2021
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2021, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! A small glob matcher for `KEYS`, supporting `*`, `?` and `[set]`

/// Returns true if `name` matches the glob `pattern`. Supports `*` (any run
/// of bytes), `?` (any single byte) and `[...]` (byte class, optionally
/// negated with a leading `^`).
pub fn glob_match(pattern: &[u8], name: &[u8]) -> bool {
    match_from(pattern, name)
}

fn match_from(mut pat: &[u8], mut txt: &[u8]) -> bool {
    // backtracking state for the most recent `*`
    let mut star_pat: Option<&[u8]> = None;
    let mut star_txt: &[u8] = &[];
    loop {
        if let Some((&p0, prest)) = pat.split_first() {
            match p0 {
                b'*' => {
                    // collapse runs of '*' and remember the backtrack point
                    star_pat = Some(prest);
                    star_txt = txt;
                    pat = prest;
                    continue;
                }
                b'?' => {
                    if let Some((_, trest)) = txt.split_first() {
                        pat = prest;
                        txt = trest;
                        continue;
                    }
                }
                b'[' => {
                    if let Some((&t0, trest)) = txt.split_first() {
                        if let Some((matched, after_class)) = match_class(prest, t0) {
                            if matched {
                                pat = after_class;
                                txt = trest;
                                continue;
                            }
                        }
                    }
                }
                _ => {
                    if let Some((&t0, trest)) = txt.split_first() {
                        if t0 == p0 {
                            pat = prest;
                            txt = trest;
                            continue;
                        }
                    }
                }
            }
        } else if txt.is_empty() {
            return true;
        }
        // mismatch: backtrack to the last '*' if we have one
        if let Some(sp) = star_pat {
            if let Some((_, trest)) = star_txt.split_first() {
                star_txt = trest;
                pat = sp;
                txt = star_txt;
                continue;
            }
        }
        return false;
    }
}

/// Parses a `[...]` class starting just after the `[`, returns whether `byte`
/// matched along with the remaining pattern slice (just after the `]`).
fn match_class(pat: &[u8], byte: u8) -> Option<(bool, &[u8])> {
    let (negate, mut rest) = match pat.first() {
        Some(b'^') => (true, &pat[1..]),
        _ => (false, pat),
    };
    let mut found = false;
    loop {
        match rest.first() {
            None => return None, // unterminated class: treat as no match
            Some(b']') => {
                rest = &rest[1..];
                break;
            }
            Some(&lo) => {
                // a-z style range
                if rest.len() >= 3 && rest[1] == b'-' && rest[2] != b']' {
                    let hi = rest[2];
                    if byte >= lo && byte <= hi {
                        found = true;
                    }
                    rest = &rest[3..];
                } else {
                    if byte == lo {
                        found = true;
                    }
                    rest = &rest[1..];
                }
            }
        }
    }
    Some((found != negate, rest))
}

#[cfg(test)]
mod tests {
    use super::glob_match as m;

    #[test]
    fn literal() {
        assert!(m(b"foo", b"foo"));
        assert!(!m(b"foo", b"foobar"));
    }

    #[test]
    fn star() {
        assert!(m(b"foo*", b"foobar"));
        assert!(m(b"*bar", b"foobar"));
        assert!(m(b"*", b""));
        assert!(m(b"f*r", b"foobar"));
        assert!(!m(b"f*r", b"foobaz"));
    }

    #[test]
    fn question() {
        assert!(m(b"fo?", b"foo"));
        assert!(!m(b"fo?", b"fo"));
    }

    #[test]
    fn class() {
        assert!(m(b"h[ae]llo", b"hello"));
        assert!(m(b"h[ae]llo", b"hallo"));
        assert!(!m(b"h[ae]llo", b"hillo"));
        assert!(m(b"h[^ae]llo", b"hillo"));
        assert!(m(b"[a-c]at", b"bat"));
    }
}
