//! Byte-level PDF grammar.
//!
//! The grammar is expressed with nom combinators over a located span so that
//! stream payload positions can be reported relative to the whole file. Every
//! entry point that the reader uses lives at the bottom of the file: `header`,
//! `binary_mark`, `indirect_object`, `xref_and_trailer` and `xref_start`.

use log::{debug, warn};
use nom::branch::alt;
use nom::bytes::complete::{tag, take, take_while, take_while1, take_while_m_n};
use nom::character::complete::{digit0, digit1, one_of};
use nom::combinator::{map, map_opt, map_res, opt, recognize, verify};
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::{fold_many0, many0};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};
use nom_locate::LocatedSpan;
use std::collections::HashSet;
use std::str::{self, FromStr};

use crate::error::{ParseError, XrefError};
use crate::object::{Dictionary, Object, ObjectId, Stream, StringFormat};
use crate::reader::{MAX_BRACKET, Reader};
use crate::xref::{Xref, XrefEntry, XrefType};
use crate::{Error, Result};

pub(crate) type ParserInput<'a> = LocatedSpan<&'a [u8], &'static str>;
type NomResult<'a, O, E = NomError<ParserInput<'a>>> = IResult<ParserInput<'a>, O, E>;

#[inline]
fn nom_error<O>(input: ParserInput) -> NomResult<O> {
    Err(nom::Err::Error(NomError::new(input, ErrorKind::Verify)))
}

fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c' | b'\0')
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn is_hex_digit(c: u8) -> bool {
    c.is_ascii_hexdigit()
}

fn eol(input: ParserInput) -> NomResult<ParserInput> {
    alt((tag(&b"\r\n"[..]), tag(&b"\n"[..]), tag(&b"\r"[..]))).parse(input)
}

fn comment(input: ParserInput) -> NomResult<()> {
    map(
        (tag(&b"%"[..]), take_while(|c: u8| c != b'\r' && c != b'\n'), opt(eol)),
        |_| (),
    )
    .parse(input)
}

/// Zero or more whitespace runs and comments.
fn space(input: ParserInput) -> NomResult<()> {
    fold_many0(
        alt((map(take_while1(is_whitespace), |_| ()), comment)),
        || (),
        |_, _| (),
    )
    .parse(input)
}

fn integer<T: FromStr>(input: ParserInput) -> NomResult<T> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |s: ParserInput| {
        str::from_utf8(s.fragment()).map_err(|_| ()).and_then(|s| s.parse::<T>().map_err(|_| ()))
    })
    .parse(input)
}

fn unsigned<T: FromStr>(input: ParserInput) -> NomResult<T> {
    map_res(digit1, |s: ParserInput| {
        str::from_utf8(s.fragment()).map_err(|_| ()).and_then(|s| s.parse::<T>().map_err(|_| ()))
    })
    .parse(input)
}

fn real(input: ParserInput) -> NomResult<f64> {
    map_res(
        recognize((
            opt(one_of("+-")),
            alt((recognize((digit1, tag(&b"."[..]), digit0)), recognize((tag(&b"."[..]), digit1)))),
        )),
        |s: ParserInput| {
            str::from_utf8(s.fragment()).map_err(|_| ()).and_then(|s| s.parse::<f64>().map_err(|_| ()))
        },
    )
    .parse(input)
}

fn from_hex_pair(pair: ParserInput) -> Option<u8> {
    str::from_utf8(pair.fragment()).ok().and_then(|s| u8::from_str_radix(s, 16).ok())
}

/// A name token. `#xx` escapes are resolved here so that dictionary keys
/// compare by their decoded value.
fn name(input: ParserInput) -> NomResult<Vec<u8>> {
    preceded(
        tag(&b"/"[..]),
        fold_many0(
            alt((
                map(
                    preceded(tag(&b"#"[..]), map_opt(take_while_m_n(2, 2, is_hex_digit), from_hex_pair)),
                    |byte| vec![byte],
                ),
                map(take_while1(|c: u8| is_regular(c) && c != b'#'), |s: ParserInput| {
                    s.fragment().to_vec()
                }),
            )),
            Vec::new,
            |mut acc, part| {
                acc.extend_from_slice(&part);
                acc
            },
        ),
    )
    .parse(input)
}

/// Literal string between balanced parentheses, with backslash escapes.
fn literal_string(input: ParserInput) -> NomResult<Vec<u8>> {
    let bytes: &[u8] = input.fragment();
    if bytes.first() != Some(&b'(') {
        return nom_error(input);
    }
    let mut depth = 1usize;
    let mut pos = 1usize;
    let mut out = Vec::new();
    while pos < bytes.len() {
        match bytes[pos] {
            b'(' => {
                depth += 1;
                if depth > MAX_BRACKET {
                    return nom_error(input);
                }
                out.push(b'(');
                pos += 1;
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    let (rest, _) = take(pos + 1).parse(input)?;
                    return Ok((rest, out));
                }
                out.push(b')');
                pos += 1;
            }
            b'\\' => {
                pos += 1;
                let Some(&escaped) = bytes.get(pos) else {
                    return nom_error(input);
                };
                match escaped {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(0x08),
                    b'f' => out.push(0x0c),
                    b'(' => out.push(b'('),
                    b')' => out.push(b')'),
                    b'\\' => out.push(b'\\'),
                    b'0'..=b'7' => {
                        let mut value = 0u16;
                        let mut digits = 0;
                        while digits < 3 {
                            match bytes.get(pos) {
                                Some(&d @ b'0'..=b'7') => {
                                    value = value * 8 + (d - b'0') as u16;
                                    pos += 1;
                                    digits += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(value as u8);
                        continue;
                    }
                    b'\r' => {
                        // Line continuation, swallows an optional LF.
                        if bytes.get(pos + 1) == Some(&b'\n') {
                            pos += 1;
                        }
                    }
                    b'\n' => {}
                    other => out.push(other),
                }
                pos += 1;
            }
            other => {
                out.push(other);
                pos += 1;
            }
        }
    }
    nom_error(input)
}

/// Hex string between angle brackets. Whitespace is ignored and a trailing
/// odd nibble is padded with zero.
fn hex_string(input: ParserInput) -> NomResult<Vec<u8>> {
    let bytes: &[u8] = input.fragment();
    if bytes.first() != Some(&b'<') || bytes.get(1) == Some(&b'<') {
        return nom_error(input);
    }
    let mut out = Vec::new();
    let mut nibble: Option<u8> = None;
    let mut pos = 1usize;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c == b'>' {
            if let Some(high) = nibble {
                out.push(high << 4);
            }
            let (rest, _) = take(pos + 1).parse(input)?;
            return Ok((rest, out));
        } else if is_whitespace(c) {
            pos += 1;
        } else if c.is_ascii_hexdigit() {
            let value = match c {
                b'0'..=b'9' => c - b'0',
                b'a'..=b'f' => c - b'a' + 10,
                _ => c - b'A' + 10,
            };
            match nibble.take() {
                Some(high) => out.push((high << 4) | value),
                None => nibble = Some(value),
            }
            pos += 1;
        } else {
            return nom_error(input);
        }
    }
    nom_error(input)
}

fn boolean(input: ParserInput) -> NomResult<Object> {
    alt((
        map(tag(&b"true"[..]), |_| Object::Boolean(true)),
        map(tag(&b"false"[..]), |_| Object::Boolean(false)),
    ))
    .parse(input)
}

fn null(input: ParserInput) -> NomResult<Object> {
    map(tag(&b"null"[..]), |_| Object::Null).parse(input)
}

pub(crate) fn object_id(input: ParserInput) -> NomResult<ObjectId> {
    pair(terminated(unsigned::<u32>, space), terminated(unsigned::<u16>, space)).parse(input)
}

fn reference(input: ParserInput) -> NomResult<Object> {
    map(terminated(object_id, tag(&b"R"[..])), Object::Reference).parse(input)
}

fn array(input: ParserInput) -> NomResult<Vec<Object>> {
    delimited(
        pair(tag(&b"["[..]), space),
        many0(terminated(direct_object, space)),
        tag(&b"]"[..]),
    )
    .parse(input)
}

fn dictionary(input: ParserInput) -> NomResult<Dictionary> {
    delimited(
        pair(tag(&b"<<"[..]), space),
        fold_many0(
            pair(terminated(name, space), terminated(direct_object, space)),
            Dictionary::new,
            |mut dict, (key, value)| {
                dict.set(key, value);
                dict
            },
        ),
        tag(&b">>"[..]),
    )
    .parse(input)
}

/// Any object that may appear nested inside arrays, dictionaries and the
/// trailer. Streams only exist at the top level of an indirect object.
pub(crate) fn direct_object(input: ParserInput) -> NomResult<Object> {
    alt((
        null,
        boolean,
        reference,
        map(real, Object::Real),
        map(integer::<i64>, Object::Integer),
        map(name, Object::Name),
        map(literal_string, |s| Object::String(s, StringFormat::Literal)),
        map(dictionary, Object::Dictionary),
        map(hex_string, |s| Object::String(s, StringFormat::Hexadecimal)),
        map(array, Object::Array),
    ))
    .parse(input)
}

/// Resolve the `/Length` entry of a stream dictionary, chasing one level of
/// indirection through the reader.
fn stream_length(dict: &Dictionary, reader: &Reader, already_seen: &mut HashSet<ObjectId>) -> Option<i64> {
    match dict.get(b"Length") {
        Ok(Object::Integer(length)) => Some(*length),
        Ok(Object::Reference(id)) => reader
            .get_object_during_parse(*id, already_seen)
            .ok()
            .and_then(|obj| obj.as_i64().ok()),
        _ => None,
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Number of payload bytes ending right before `marker`, with the EOL that
/// separates payload from `endstream` trimmed off.
fn trim_stream_eol(remaining: &[u8], marker: usize) -> usize {
    let mut recovered = marker;
    for _ in 0..2 {
        if recovered > 0 && matches!(remaining[recovered - 1], b'\r' | b'\n') {
            recovered -= 1;
        } else {
            break;
        }
    }
    recovered
}

/// Stream body following a dictionary at the top level of an indirect object.
///
/// `base_offset` is where the sliced parser input begins in the whole file,
/// so that `start_position` can be recorded in file coordinates.
fn stream<'a>(
    input: ParserInput<'a>, dict: Dictionary, reader: &Reader, already_seen: &mut HashSet<ObjectId>,
    base_offset: usize,
) -> Result<(ParserInput<'a>, Object)> {
    let (input, _) = (space, tag(&b"stream"[..]), opt(tag(&b"\r"[..])), tag(&b"\n"[..]))
        .parse(input)
        .map_err(|_: nom::Err<NomError<ParserInput>>| malformed("stream keyword", base_offset))?;
    let content_start = base_offset + input.location_offset();
    let remaining: &[u8] = input.fragment();
    let length_is_unresolved_ref =
        matches!(dict.get(b"Length"), Ok(Object::Reference(_))) && stream_length(&dict, reader, already_seen).is_none();

    // An indirect /Length that cannot be resolved yet: record the payload
    // position, skip to the endstream marker and let the reader cut the
    // bytes once the length object is loaded.
    if length_is_unresolved_ref {
        let marker = find_subslice(remaining, b"endstream").ok_or_else(|| malformed("endstream keyword", content_start))?;
        let (input, _) = take(marker + b"endstream".len())
            .parse(input)
            .map_err(|_: nom::Err<NomError<ParserInput>>| malformed("endstream keyword", content_start))?;
        let stream = Stream::with_position(dict, content_start);
        return Ok((input, Object::Stream(stream)));
    }

    let declared = stream_length(&dict, reader, already_seen);
    let length = match declared {
        Some(length) if length >= 0 && (length as usize) <= remaining.len() => {
            // Trust the declared length only when an endstream marker follows
            // within a couple of EOL bytes.
            let after = &remaining[length as usize..];
            let skip = after.iter().take(2).take_while(|c| is_whitespace(**c)).count();
            if after[skip..].starts_with(b"endstream") {
                Some(length as usize)
            } else {
                None
            }
        }
        _ => None,
    };

    let length = match length {
        Some(length) => length,
        None => {
            let marker = find_subslice(remaining, b"endstream");
            let recovered = marker.map(|m| trim_stream_eol(remaining, m));
            match (declared, recovered) {
                (_, None) => return Err(malformed("endstream keyword", content_start)),
                (Some(declared), Some(actual)) => {
                    if !reader.options.is_relaxed() {
                        return Err(Error::StreamLength { declared, actual });
                    }
                    warn!(
                        "stream at offset {} declares length {} but endstream sits after {} bytes",
                        content_start, declared, actual
                    );
                    actual
                }
                (None, Some(actual)) => {
                    if !reader.options.is_relaxed() {
                        return Err(malformed("stream Length entry", content_start));
                    }
                    debug!("stream at offset {} has no usable Length, recovered {} bytes", content_start, actual);
                    actual
                }
            }
        }
    };

    let (input, content) = take(length)
        .parse(input)
        .map_err(|_: nom::Err<NomError<ParserInput>>| malformed("stream body", content_start))?;
    let (input, _) = (space, tag(&b"endstream"[..]))
        .parse(input)
        .map_err(|_: nom::Err<NomError<ParserInput>>| malformed("endstream keyword", content_start))?;

    let mut stream = Stream::new(dict, content.fragment().to_vec());
    stream.start_position = Some(content_start);
    Ok((input, Object::Stream(stream)))
}

fn object<'a>(
    input: ParserInput<'a>, reader: &Reader, already_seen: &mut HashSet<ObjectId>, base_offset: usize,
) -> Result<(ParserInput<'a>, Object)> {
    let (rest, parsed) = direct_object(input).map_err(|_| malformed("object body", base_offset))?;
    if let Object::Dictionary(dict) = parsed {
        let stream_follows = preceded(space, tag(&b"stream"[..]))
            .parse(rest)
            .map(|_: (ParserInput, ParserInput)| ())
            .is_ok();
        if stream_follows {
            return stream(rest, dict, reader, already_seen, base_offset);
        }
        return Ok((rest, Object::Dictionary(dict)));
    }
    Ok((rest, parsed))
}

/// Parse `n g obj ... endobj` at `offset` within `input`.
pub(crate) fn indirect_object(
    input: ParserInput, offset: usize, expected_id: Option<ObjectId>, reader: &Reader,
    already_seen: &mut HashSet<ObjectId>,
) -> Result<(ObjectId, Object)> {
    let bytes: &[u8] = input.fragment();
    if offset > bytes.len() {
        return Err(Error::InvalidOffset(offset));
    }
    let slice = ParserInput::new_extra(&bytes[offset..], input.extra);

    let (slice, _) = space(slice).map_err(|_| malformed("indirect object", offset))?;
    let (slice, id) = object_id(slice).map_err(|_| malformed("indirect object id", offset))?;
    if let Some(expected) = expected_id {
        if expected != id {
            warn!(
                "object at offset {} has id {} {}, cross-reference table says {} {}",
                offset, id.0, id.1, expected.0, expected.1
            );
            return Err(Error::Parse(ParseError::ObjectIdMismatch));
        }
    }
    let (slice, _) = pair(tag(&b"obj"[..]), space)
        .parse(slice)
        .map_err(|_: nom::Err<NomError<ParserInput>>| malformed("obj keyword", offset))?;

    let (slice, object) = object(slice, reader, already_seen, offset)?;

    let (slice, _) = space(slice).map_err(|_| malformed("object body", offset))?;
    let (_, endobj) = opt(tag(&b"endobj"[..])).parse(slice).map_err(
        |_: nom::Err<NomError<ParserInput>>| malformed("endobj keyword", offset),
    )?;
    if endobj.is_none() {
        if reader.options.is_relaxed() {
            debug!("object {} {} at offset {} has no endobj keyword", id.0, id.1, offset);
        } else {
            return Err(malformed("endobj keyword", offset));
        }
    }

    Ok((id, object))
}

fn malformed(context: &'static str, offset: usize) -> Error {
    Error::Parse(ParseError::Malformed { context, offset })
}

/// `%PDF-M.N` header; returns the version as written.
pub(crate) fn header(input: ParserInput) -> Option<String> {
    let result: NomResult<String> = map_res(
        (
            tag(&b"%PDF-"[..]),
            verify(
                recognize((digit1, tag(&b"."[..]), digit1)),
                |version: &ParserInput| version.fragment().len() <= 3,
            ),
        ),
        |(_, version): (_, ParserInput)| str::from_utf8(version.fragment()).map(str::to_string),
    )
    .parse(input);
    result.ok().map(|(_, version)| version)
}

/// Comment bytes on the line after the header; a binary marker when all of
/// them have the high bit set.
pub(crate) fn binary_mark(input: ParserInput) -> Option<Vec<u8>> {
    let result: NomResult<Vec<u8>> = map(
        preceded(tag(&b"%"[..]), take_while(|c: u8| c != b'\r' && c != b'\n')),
        |bytes: ParserInput| bytes.fragment().to_vec(),
    )
    .parse(input);
    result.ok().map(|(_, bytes)| bytes)
}

/// Integer following the `startxref` keyword.
pub(crate) fn xref_start(input: ParserInput) -> Option<i64> {
    map(
        (tag(&b"startxref"[..]), space, integer::<i64>),
        |(_, _, offset)| offset,
    )
    .parse(input)
    .ok()
    .map(|(_, offset)| offset)
}

/// One 20-byte classical cross-reference entry.
fn xref_entry(input: ParserInput) -> NomResult<(u64, u16, u8)> {
    map(
        (
            terminated(unsigned::<u64>, tag(&b" "[..])),
            terminated(unsigned::<u16>, tag(&b" "[..])),
            one_of("nf"),
            alt((tag(&b" \r"[..]), tag(&b" \n"[..]), tag(&b"\r\n"[..]), tag(&b"\n"[..]), tag(&b"\r"[..]))),
        ),
        |(field1, field2, kind, _)| (field1, field2, kind as u8),
    )
    .parse(input)
}

/// Classical cross-reference table: subsection headers followed by fixed
/// width entries.
fn xref_table(input: ParserInput) -> NomResult<Xref> {
    let (input, _) = (tag(&b"xref"[..]), space).parse(input)?;
    let mut xref = Xref::new(0, XrefType::CrossReferenceTable);
    let mut rest = input;
    loop {
        let Ok((after_header, (start, count))) = pair(
            terminated(unsigned::<u32>, take_while1(|c| c == b' ')),
            terminated(unsigned::<u32>, (take_while(|c| c == b' '), eol)),
        )
        .parse(rest) else {
            break;
        };
        let mut current = after_header;
        for index in 0..count {
            let id = start + index;
            let (next, (field1, field2, kind)) = xref_entry(current)?;
            match kind {
                b'n' => {
                    xref.insert(
                        id,
                        XrefEntry::Normal {
                            offset: field1,
                            generation: field2,
                        },
                    );
                }
                _ => {
                    if id != 0 {
                        xref.insert(
                            id,
                            XrefEntry::Free {
                                next_free: field1 as u32,
                                generation: field2,
                            },
                        );
                    }
                }
            }
            current = next;
        }
        rest = current;
    }
    Ok((rest, xref))
}

fn trailer(input: ParserInput) -> NomResult<Dictionary> {
    preceded((tag(&b"trailer"[..]), space), dictionary).parse(input)
}

/// `trailer <<...>>` parsed in isolation, for linear-scan recovery.
pub(crate) fn trailer_at(input: ParserInput) -> Option<Dictionary> {
    trailer(input).ok().map(|(_, dict)| dict)
}

/// Either a classical `xref` table followed by `trailer`, or an indirect
/// object holding a cross-reference stream.
pub(crate) fn xref_and_trailer(input: ParserInput, reader: &Reader) -> Result<(Xref, Dictionary)> {
    let offset = input.location_offset();
    if input.fragment().starts_with(b"xref") {
        let (rest, xref) = xref_table(input).map_err(|_| Error::Xref(XrefError::Section(offset)))?;
        let (_, trailer) = preceded(space, trailer)
            .parse(rest)
            .map_err(|_: nom::Err<NomError<ParserInput>>| Error::Parse(ParseError::InvalidTrailer))?;
        let mut xref = xref;
        if let Ok(size) = trailer.get(b"Size").and_then(Object::as_i64) {
            xref.size = xref.size.max(size.max(0) as u32);
        }
        return Ok((xref, trailer));
    }

    let (_, object) = indirect_object(input, 0, None, reader, &mut HashSet::new())
        .map_err(|_| Error::Xref(XrefError::Section(offset)))?;
    let stream = object.as_stream()?;
    if !stream.dict.has_type(b"XRef") {
        return Err(Error::Xref(XrefError::Section(offset)));
    }
    decode_xref_stream(stream, reader)
}

fn be_integer(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, byte| (acc << 8) | *byte as u64)
}

/// Decode a cross-reference stream into entries, driven by its `/W` column
/// widths and `/Index` subsections.
pub(crate) fn decode_xref_stream(stream: &Stream, reader: &Reader) -> Result<(Xref, Dictionary)> {
    let trailer = stream.dict.clone();
    let content = stream.decompressed_content_with_limits(&reader.options.limits)?;

    let widths: Vec<usize> = trailer
        .get(b"W")
        .and_then(Object::as_array)
        .map_err(|_| Error::Parse(ParseError::InvalidXref))?
        .iter()
        .map(|w| w.as_i64().map(|w| w as usize))
        .collect::<Result<_>>()
        .map_err(|_| Error::Parse(ParseError::InvalidXref))?;
    if widths.len() != 3 || widths.iter().any(|w| *w > 8) {
        return Err(Error::Parse(ParseError::InvalidXref));
    }
    let row_width: usize = widths.iter().sum();
    if row_width == 0 {
        return Err(Error::Parse(ParseError::InvalidXref));
    }

    let size = trailer
        .get(b"Size")
        .and_then(Object::as_i64)
        .map_err(|_| Error::Parse(ParseError::InvalidXref))?;
    let subsections: Vec<(u32, u32)> = match trailer.get(b"Index").and_then(Object::as_array) {
        Ok(index) => index
            .chunks_exact(2)
            .map(|chunk| {
                Ok((
                    chunk[0].as_i64()? as u32,
                    chunk[1].as_i64()? as u32,
                ))
            })
            .collect::<Result<_>>()
            .map_err(|_: Error| Error::Parse(ParseError::InvalidXref))?,
        Err(_) => vec![(0, size.max(0) as u32)],
    };

    let mut xref = Xref::new(size.max(1) as u32, XrefType::CrossReferenceStream);
    let mut rows = content.chunks_exact(row_width);
    for (start, count) in subsections {
        for index in 0..count {
            let Some(row) = rows.next() else {
                warn!("cross-reference stream ends before all announced entries");
                return Ok((xref, trailer));
            };
            let id = start + index;
            let (type_field, rest) = row.split_at(widths[0]);
            let (second, third) = rest.split_at(widths[1]);
            // A zero-width type column defaults to type 1.
            let entry_type = if widths[0] == 0 { 1 } else { be_integer(type_field) };
            match entry_type {
                0 => {
                    if id != 0 {
                        xref.insert(
                            id,
                            XrefEntry::Free {
                                next_free: be_integer(second) as u32,
                                generation: be_integer(third) as u16,
                            },
                        );
                    }
                }
                1 => xref.insert(
                    id,
                    XrefEntry::Normal {
                        offset: be_integer(second),
                        generation: be_integer(third) as u16,
                    },
                ),
                2 => xref.insert(
                    id,
                    XrefEntry::Compressed {
                        container: be_integer(second) as u32,
                        index: be_integer(third) as u16,
                    },
                ),
                other => debug!("ignoring cross-reference entry of unknown type {}", other),
            }
        }
    }

    Ok((xref, trailer))
}

/// Parse the integer pair header of an object stream: `N` pairs of
/// `object-number offset`.
pub(crate) fn object_stream_header(input: ParserInput, count: usize) -> Result<Vec<(u32, usize)>> {
    let mut pairs = Vec::with_capacity(count);
    let mut rest = input;
    for _ in 0..count {
        let (next, pair) = pair(
            preceded(space, unsigned::<u32>),
            preceded(space, unsigned::<usize>),
        )
        .parse(rest)
        .map_err(|_: nom::Err<NomError<ParserInput>>| Error::Parse(ParseError::InvalidObjectStream))?;
        pairs.push(pair);
        rest = next;
    }
    Ok(pairs)
}

/// Parse one direct object at `offset` inside a decoded object stream body.
pub(crate) fn object_stream_entry(input: ParserInput, offset: usize) -> Result<Object> {
    let bytes: &[u8] = input.fragment();
    if offset > bytes.len() {
        return Err(Error::Parse(ParseError::InvalidObjectStream));
    }
    let slice = ParserInput::new_extra(&bytes[offset..], input.extra);
    preceded(space, direct_object)
        .parse(slice)
        .map(|(_, object)| object)
        .map_err(|_: nom::Err<NomError<ParserInput>>| Error::Parse(ParseError::InvalidObjectStream))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Object {
        direct_object(ParserInput::new_extra(input, "test")).unwrap().1
    }

    #[test]
    fn parse_numbers() {
        assert_eq!(parse(b"42 "), Object::Integer(42));
        assert_eq!(parse(b"-17 "), Object::Integer(-17));
        assert_eq!(parse(b"+3 "), Object::Integer(3));
        assert_eq!(parse(b"3.14 "), Object::Real(3.14));
        assert_eq!(parse(b"-.5 "), Object::Real(-0.5));
        assert_eq!(parse(b"4. "), Object::Real(4.0));
    }

    #[test]
    fn parse_name_with_escapes() {
        assert_eq!(parse(b"/Name1 "), Object::Name(b"Name1".to_vec()));
        assert_eq!(parse(b"/A#20B "), Object::Name(b"A B".to_vec()));
        assert_eq!(parse(b"/Lime#20Green "), Object::Name(b"Lime Green".to_vec()));
    }

    #[test]
    fn parse_literal_string() {
        assert_eq!(parse(b"(hello) "), Object::string_literal("hello"));
        assert_eq!(parse(b"(a(b)c) "), Object::string_literal("a(b)c"));
        assert_eq!(parse(br"(a\(b) "), Object::string_literal("a(b"));
        assert_eq!(parse(br"(\101) "), Object::string_literal("A"));
        assert_eq!(parse(br"(\n) "), Object::string_literal("\n"));
        assert_eq!(parse(b"(cont\\\ninued) "), Object::string_literal("continued"));
    }

    #[test]
    fn parse_hex_string() {
        assert_eq!(
            parse(b"<48 65 6C6C 6F> "),
            Object::String(b"Hello".to_vec(), StringFormat::Hexadecimal)
        );
        // Odd trailing digit pads with zero.
        assert_eq!(
            parse(b"<901FA> "),
            Object::String(vec![0x90, 0x1f, 0xa0], StringFormat::Hexadecimal)
        );
    }

    #[test]
    fn parse_collections() {
        assert_eq!(parse(b"[] "), Object::Array(vec![]));
        assert_eq!(parse(b"<<>> "), Object::Dictionary(Dictionary::new()));
        let obj = parse(b"[1 0 R /Two (three)] ");
        let array = obj.as_array().unwrap();
        assert_eq!(array[0], Object::Reference((1, 0)));
        assert_eq!(array[1], Object::Name(b"Two".to_vec()));

        let obj = parse(b"<</Type/Page/Parent 3 0 R/MediaBox[0 0 612 792]>> ");
        let dict = obj.as_dict().unwrap();
        assert!(dict.has_type(b"Page"));
        assert_eq!(dict.get(b"Parent").unwrap(), &Object::Reference((3, 0)));
    }

    #[test]
    fn deep_bracket_nesting_is_rejected() {
        let mut deep = vec![b'('; MAX_BRACKET + 1];
        deep.extend(vec![b')'; MAX_BRACKET + 1]);
        deep.push(b' ');
        assert!(direct_object(ParserInput::new_extra(&deep, "test")).is_err());
    }

    #[test]
    fn comments_are_whitespace() {
        assert_eq!(parse(b"[1 % comment\n2] "), Object::Array(vec![1.into(), 2.into()]));
    }

    #[test]
    fn parse_header_versions() {
        assert_eq!(header(ParserInput::new_extra(b"%PDF-1.7\n", "t")), Some("1.7".into()));
        assert_eq!(header(ParserInput::new_extra(b"%PDF-2.0\n", "t")), Some("2.0".into()));
        assert_eq!(header(ParserInput::new_extra(b"not a pdf", "t")), None);
    }

    #[test]
    fn parse_classical_xref() {
        let data = b"xref\n0 3\n0000000000 65535 f \n0000000017 00000 n \n0000000081 00000 n \ntrailer\n<</Size 3/Root 1 0 R>>\nstartxref\n123\n%%EOF";
        let (rest, xref) = xref_table(ParserInput::new_extra(data, "t")).unwrap();
        assert_eq!(
            xref.get(1),
            Some(&XrefEntry::Normal {
                offset: 17,
                generation: 0
            })
        );
        assert_eq!(
            xref.get(2),
            Some(&XrefEntry::Normal {
                offset: 81,
                generation: 0
            })
        );
        let (_, trailer) = preceded(space, trailer).parse(rest).unwrap();
        assert_eq!(trailer.get(b"Size").unwrap(), &Object::Integer(3));
    }

    #[test]
    fn parse_xref_subsections() {
        let data = b"xref\n0 1\n0000000000 65535 f \n4 2\n0000000100 00000 n \n0000000200 00001 n \ntrailer\n<</Size 6>>";
        let (_, xref) = xref_table(ParserInput::new_extra(data, "t")).unwrap();
        assert!(xref.get(1).is_none());
        assert_eq!(
            xref.get(5),
            Some(&XrefEntry::Normal {
                offset: 200,
                generation: 1
            })
        );
    }

    #[test]
    fn startxref_offset() {
        assert_eq!(xref_start(ParserInput::new_extra(b"startxref\n1234\n%%EOF", "t")), Some(1234));
    }
}
