use super::element::Element;
use super::tokens::*;
use crate::Error;
use nom::{bytes::complete::take, number::complete::be_u8, IResult};

type PResult<'a, O> = IResult<&'a [u8], O>;

fn mb_uint32(input: &[u8]) -> PResult<'_, u32> {
    let mut result: u32 = 0;
    let mut rest = input;
    loop {
        let (next, b) = be_u8(rest)
            .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| {
                nom::Err::Failure(nom::error::Error::new(rest, nom::error::ErrorKind::Eof))
            })?;
        result = (result << 7) | (b as u32 & 0x7F);
        rest = next;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((rest, result))
}

/// Stateful WBXML body decoder. Holds the string table and the code page
/// that persists across sibling elements, mirroring the cursor the encoder
/// side tracks when switching pages.
struct Decoder<'a> {
    string_table: &'a [u8],
    current_page: u8,
}

impl<'a> Decoder<'a> {
    fn string_from_table(&self, offset: usize) -> Result<String, Error> {
        let table = self.string_table;
        if offset > table.len() {
            return Err(Error::MalformedFrame(
                "string table offset out of range".into(),
            ));
        }
        let end = table[offset..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| offset + p)
            .unwrap_or(table.len());
        String::from_utf8(table[offset..end].to_vec()).map_err(|_| Error::DecodingError)
    }

    fn tag_name(&self, token: u8) -> Result<String, Error> {
        let code = token & TAG_CODE_MASK;
        page_tags(self.current_page)
            .get(&code)
            .map(|s| s.to_string())
            .ok_or(Error::UnknownToken {
                page: self.current_page,
                code,
            })
    }

    /// Parse one element (and its subtree) from `input`, or `None` if the
    /// next token is `END` (no more siblings at this depth).
    fn parse_element<'i>(
        &mut self,
        input: &'i [u8],
    ) -> Result<(&'i [u8], Option<Element>), Error> {
        let mut rest = input;
        let mut token = read_u8(&mut rest)?;

        while token == SWITCH_PAGE {
            self.current_page = read_u8(&mut rest)?;
            token = read_u8(&mut rest)?;
        }

        if token == END {
            return Ok((rest, None));
        }

        let has_content = token & TAG_HAS_CONTENT != 0;
        // has_attrs is intentionally ignored: SyncML 1.2 never sets it, and an
        // encoder that respects §4.2 never emits it either.

        let tag = if token & TAG_CODE_MASK == LITERAL {
            let (next, offset) =
                mb_uint32(rest).map_err(|_| Error::MalformedFrame("truncated LITERAL".into()))?;
            rest = next;
            self.string_from_table(offset as usize)?
        } else {
            self.tag_name(token)?
        };

        let mut elem = Element::new(tag);
        if has_content {
            rest = self.parse_content(rest, &mut elem)?;
        }

        Ok((rest, Some(elem)))
    }

    fn parse_content<'i>(&mut self, input: &'i [u8], elem: &mut Element) -> Result<&'i [u8], Error> {
        let mut rest = input;
        let mut text_parts: Vec<String> = Vec::new();

        loop {
            let token = peek_u8(rest)?;

            match token {
                END => {
                    rest = &rest[1..];
                    break;
                }
                SWITCH_PAGE => {
                    rest = &rest[1..];
                    self.current_page = read_u8(&mut rest)?;
                }
                STR_I => {
                    rest = &rest[1..];
                    let (next, s) = read_cstring(rest)?;
                    rest = next;
                    text_parts.push(s);
                }
                STR_T => {
                    rest = &rest[1..];
                    let (next, offset) = mb_uint32(rest)
                        .map_err(|_| Error::MalformedFrame("truncated STR_T".into()))?;
                    rest = next;
                    text_parts.push(self.string_from_table(offset as usize)?);
                }
                OPAQUE => {
                    rest = &rest[1..];
                    let (next, len) = mb_uint32(rest)
                        .map_err(|_| Error::MalformedFrame("truncated OPAQUE length".into()))?;
                    let (next, data) = take::<_, _, nom::error::Error<&[u8]>>(len as usize)(next)
                        .map_err(|_| Error::MalformedFrame("truncated OPAQUE data".into()))?;
                    rest = next;
                    // The encoder never emits OPAQUE, but some clients wrap their
                    // nonce in it; normalize to text (UTF-8, else Base64) so it
                    // round-trips through the same meta-map storage as STR_I/STR_T.
                    text_parts.push(match std::str::from_utf8(data) {
                        Ok(s) => s.to_string(),
                        Err(_) => base64::Engine::encode(
                            &base64::engine::general_purpose::STANDARD,
                            data,
                        ),
                    });
                }
                _ => {
                    // Not a global token: it's a child tag, recurse into it.
                    let (next, child) = self.parse_element(rest)?;
                    rest = next;
                    if let Some(child) = child {
                        elem.push(child);
                    }
                }
            }
        }

        if !text_parts.is_empty() {
            elem.text = Some(text_parts.concat());
        }

        Ok(rest)
    }
}

fn read_u8(input: &mut &[u8]) -> Result<u8, Error> {
    let (next, b) = be_u8::<_, nom::error::Error<&[u8]>>(*input)
        .map_err(|_| Error::MalformedFrame("unexpected end of data".into()))?;
    *input = next;
    Ok(b)
}

fn peek_u8(input: &[u8]) -> Result<u8, Error> {
    input
        .first()
        .copied()
        .ok_or_else(|| Error::MalformedFrame("unexpected end of data".into()))
}

fn read_cstring(input: &[u8]) -> Result<(&[u8], String), Error> {
    let end = input
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::MalformedFrame("unterminated inline string".into()))?;
    let s = String::from_utf8(input[..end].to_vec()).map_err(|_| Error::DecodingError)?;
    Ok((&input[end + 1..], s))
}

/// Decode a complete WBXML document into the element tree IR.
pub fn decode(data: &[u8]) -> Result<Element, Error> {
    let mut rest = data;
    let _version = read_u8(&mut rest)?;
    let public_id = mb_uint32(rest)
        .map_err(|_| Error::MalformedFrame("truncated public identifier".into()))?;
    rest = public_id.0;
    if public_id.1 == 0 {
        // Public ID given as a string-table offset; not needed for our fixed
        // SyncML 1.2 document type, but the index must still be consumed.
        let (next, _index) =
            mb_uint32(rest).map_err(|_| Error::MalformedFrame("truncated public id index".into()))?;
        rest = next;
    }

    let (next, _charset) =
        mb_uint32(rest).map_err(|_| Error::MalformedFrame("truncated charset".into()))?;
    rest = next;

    let (next, str_table_len) =
        mb_uint32(rest).map_err(|_| Error::MalformedFrame("truncated string table length".into()))?;
    rest = next;

    let str_table_len = str_table_len as usize;
    if rest.len() < str_table_len {
        return Err(Error::MalformedFrame("truncated string table".into()));
    }
    let (string_table, body) = rest.split_at(str_table_len);

    let mut decoder = Decoder {
        string_table,
        current_page: PAGE_SYNCML,
    };

    match decoder.parse_element(body)? {
        (_, Some(root)) => Ok(root),
        (_, None) => Err(Error::MalformedFrame("document has no root element".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_empty_syncml_element() {
        // version 1.3, public id 0x1201 (MB: 0xA4 0x01), charset 106 (UTF-8),
        // zero-length string table, SyncML tag (0x2D) with no content.
        let bytes = [0x03, 0xA4, 0x01, 0x6A, 0x00, 0x2D];
        let elem = decode(&bytes).unwrap();
        assert_eq!(elem.tag, "SyncML");
        assert!(elem.text.is_none());
        assert!(elem.children.is_empty());
    }

    #[test]
    fn scenario_six_literal_bytes_are_internally_inconsistent() {
        // The exact bytes quoted by the end-to-end scenario this fixture is
        // named after: `03 01 6A 00 00 2D 00 01`. Its prose describes them as
        // "public id 0" (i.e. a zero MB byte, deferring to a string-table
        // offset), but the second byte is actually `0x01`, an MB value of 1,
        // not 0 -- the two don't agree. Walking the real field layout off of
        // the literal bytes leaves a body of `[0x00, 0x2D, 0x00, 0x01]`: the
        // leading 0x00 is read as SWITCH_PAGE (not the SyncML tag token),
        // consuming 0x2D as a page byte, and the trailing 0x00/0x01 repeat
        // that, exhausting the input before any tag is read. This is the
        // scenario's literal fixture pinned to what it actually decodes to,
        // not what its prose claims; `decodes_empty_syncml_element` above is
        // the fixture that actually exercises a well-formed empty element.
        let bytes = [0x03, 0x01, 0x6A, 0x00, 0x00, 0x2D, 0x00, 0x01];
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn mb_uint32_is_an_involution_at_boundaries() {
        for &v in &[0u32, 1, 127, 128, 16383, 16384, (1 << 28) - 1] {
            let encoded = super::super::encode::test_mb_uint32(v);
            let (rest, decoded) = mb_uint32(&encoded).unwrap();
            assert!(rest.is_empty());
            assert_eq!(decoded, v);
        }
    }
}
