//! Utilities for composing, decoding, and encoding messages.

use std::cell::Cell;
use std::io::{Cursor, Read, Write};

use rand::random;

use crate::name::{to_ascii, to_unicode};
use crate::record::{Class, Record, RecordType};

/// Maximum size of a DNS message, in bytes.
pub const MESSAGE_LIMIT: usize = 512;

/// Maximum length of a name segment (i.e. a `.`-separated identifier).
pub const LABEL_LIMIT: usize = 63;

/// Maximum total length of a name, in encoded format.
pub const NAME_LIMIT: usize = 255;

/// An error response code received in a response message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{}", .0.get_error())]
pub struct DnsError(pub RCode);

/// Represents an error in decoding a DNS message.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Extraneous data encountered at the end of message
    #[error("extraneous data")]
    ExtraneousData,
    /// Message end was encountered before expected
    #[error("short message")]
    ShortMessage,
    /// Unable to decode invalid data
    #[error("invalid message")]
    InvalidMessage,
    /// An invalid name was encountered
    #[error("invalid name")]
    InvalidName,
}

/// Represents an error in encoding a DNS message.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum EncodeError {
    /// A name or label was too long or contained invalid characters
    #[error("invalid name value")]
    InvalidName,
    /// Message exceeded given buffer or `MESSAGE_LIMIT` bytes
    #[error("message too long")]
    TooLong,
}

/// Reads a single DNS message from a series of bytes.
pub struct MsgReader<'a> {
    data: Cursor<&'a [u8]>,
}

impl<'a> MsgReader<'a> {
    /// Constructs a new message reader.
    pub fn new(data: &'a [u8]) -> MsgReader<'a> {
        MsgReader { data: Cursor::new(data) }
    }

    /// Returns the number of bytes remaining in the message.
    pub fn remaining(&self) -> usize {
        self.data.get_ref().len().saturating_sub(self.data.position() as usize)
    }

    /// Reads a number of bytes equal to the length of the given buffer.
    /// Returns `Err(ShortMessage)` if there are not enough bytes remaining.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        self.data.read_exact(buf).map_err(|_| DecodeError::ShortMessage)
    }

    /// Reads a single byte from the message.
    pub fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let mut buf = [0];
        self.read(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a big-endian unsigned 16 bit integer.
    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let mut buf = [0; 2];
        self.read(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    /// Reads a big-endian unsigned 32 bit integer.
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let mut buf = [0; 4];
        self.read(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    /// Reads `n` bytes, which are inserted at the end of the given buffer.
    pub fn read_into(&mut self, buf: &mut Vec<u8>, n: usize) -> Result<(), DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::ShortMessage);
        }
        let len = buf.len();
        buf.resize(len + n, 0);
        self.read(&mut buf[len..])
    }

    /// Reads a name from the message.
    pub fn read_name(&mut self) -> Result<String, DecodeError> {
        // Every pointer must land strictly before the previous jump target,
        // so a chain of pointers always terminates.
        let mut limit = self.data.position();
        // Offset to return to if we've finished parsing a pointer reference
        let mut restore = None;

        let mut res = String::new();
        let mut total_read = 0;

        loop {
            let len = self.read_byte()?;

            if len == 0 {
                if total_read + 1 > NAME_LIMIT {
                    return Err(DecodeError::InvalidName);
                }
                break;
            }

            if len & 0b1100_0000 == 0b1100_0000 {
                let hi = (len & 0b0011_1111) as u64;
                let lo = self.read_byte()? as u64;
                let offset = (hi << 8) | lo;

                if offset >= limit {
                    return Err(DecodeError::InvalidName);
                }
                limit = offset;

                if restore.is_none() {
                    restore = Some(self.data.position());
                }

                self.data.set_position(offset);
                continue;
            } else if len & 0b1100_0000 != 0 {
                return Err(DecodeError::InvalidMessage);
            }

            if total_read + 1 + len as usize > NAME_LIMIT {
                return Err(DecodeError::InvalidName);
            }
            total_read += 1 + len as usize;

            self.read_segment(&mut res, len as usize)?;
        }

        if res.is_empty() {
            res.push('.');
        } else {
            res.shrink_to_fit();
        }

        if let Some(pos) = restore {
            self.data.set_position(pos);
        }

        Ok(res)
    }

    fn read_segment(&mut self, buf: &mut String, len: usize) -> Result<(), DecodeError> {
        let mut bytes = [0; LABEL_LIMIT];

        self.read(&mut bytes[..len])?;

        let seg = std::str::from_utf8(&bytes[..len])
            .ok()
            .filter(|s| s.is_ascii() && is_valid_segment(s))
            .ok_or(DecodeError::InvalidName)?;

        let label = to_unicode(seg).map_err(|_| DecodeError::InvalidName)?;

        buf.push_str(&label);
        buf.push('.');
        Ok(())
    }

    /// Called at the end of message parsing. Returns `Err(ExtraneousData)`
    /// if there are any unread bytes remaining.
    fn finish(self) -> Result<(), DecodeError> {
        if self.remaining() == 0 {
            Ok(())
        } else {
            Err(DecodeError::ExtraneousData)
        }
    }

    /// Reads a message header
    fn read_header(&mut self) -> Result<FullHeader, DecodeError> {
        let id = self.read_u16()?;
        let flags0 = self.read_byte()?;
        let flags1 = self.read_byte()?;

        // 1 bit: query or response flag
        let qr = flags0 & 0b1000_0000;
        // 4 bits: opcode
        let op = (flags0 & 0b0111_1000) >> 3;
        // 1 bit: authoritative answer flag
        let aa = flags0 & 0b0000_0100;
        // 1 bit: truncation flag
        let tc = flags0 & 0b0000_0010;
        // 1 bit: recursion desired flag
        let rd = flags0 & 0b0000_0001;

        // 1 bit: recursion available flag
        let ra = flags1 & 0b1000_0000;
        // 3 bits: reserved for future use
        // 4 bits: response code
        let rc = flags1 & 0b0000_1111;

        Ok(FullHeader {
            header: Header {
                id,
                qr: if qr == 0 { Qr::Query } else { Qr::Response },
                op: OpCode::from_u8(op),
                authoritative: aa != 0,
                truncated: tc != 0,
                recursion_desired: rd != 0,
                recursion_available: ra != 0,
                rcode: RCode::from_u8(rc),
            },
            qd_count: self.read_u16()?,
            an_count: self.read_u16()?,
            ns_count: self.read_u16()?,
            ar_count: self.read_u16()?,
        })
    }

    /// Reads a question item
    fn read_question(&mut self) -> Result<Question, DecodeError> {
        let name = self.read_name()?;
        let q_type = self.read_u16()?;
        let q_class = self.read_u16()?;

        Ok(Question {
            name,
            q_type: RecordType::from_u16(q_type),
            q_class: Class::from_u16(q_class),
        })
    }

    /// Reads a resource record item
    fn read_resource(&mut self) -> Result<Resource, DecodeError> {
        let name = self.read_name()?;
        let r_type = self.read_u16()?;
        let r_class = self.read_u16()?;
        let ttl = self.read_u32()?;
        let length = self.read_u16()? as usize;
        let r_type = RecordType::from_u16(r_type);

        let data = match r_type {
            RecordType::CName => self.read_name_rdata(length)?,
            _ => {
                let mut data = Vec::new();
                self.read_into(&mut data, length)?;
                data
            }
        };

        Ok(Resource {
            name,
            r_type,
            r_class: Class::from_u16(r_class),
            ttl,
            data,
        })
    }

    /// Reads rdata made of a single name, which may point anywhere earlier
    /// in the message. The name is stored expanded so that `Resource::data`
    /// decodes on its own.
    fn read_name_rdata(&mut self, length: usize) -> Result<Vec<u8>, DecodeError> {
        if length > self.remaining() {
            return Err(DecodeError::ShortMessage);
        }
        let start = self.data.position();
        let name = self.read_name()?;

        if self.data.position() - start != length as u64 {
            return Err(DecodeError::InvalidMessage);
        }

        let mut buf = [0; MESSAGE_LIMIT];
        let mut w = MsgWriter::new(&mut buf[..]);
        w.write_name(&name).map_err(|_| DecodeError::InvalidName)?;
        Ok(w.into_bytes().to_vec())
    }
}

/// Writes a single DNS message as a series of bytes.
pub struct MsgWriter<'a> {
    data: Cursor<&'a mut [u8]>,
}

impl<'a> MsgWriter<'a> {
    /// Constructs a new message writer that will write into the given byte slice.
    pub fn new(data: &'a mut [u8]) -> MsgWriter<'a> {
        MsgWriter { data: Cursor::new(data) }
    }

    /// Returns the number of bytes written so far.
    pub fn written(&self) -> usize {
        self.data.position() as usize
    }

    /// Returns a subslice of the wrapped byte slice that contains only the
    /// bytes written.
    pub fn into_bytes(self) -> &'a [u8] {
        let n = self.written();
        &self.data.into_inner()[..n]
    }

    /// Writes a series of bytes to the message. Returns `Err(TooLong)` if the
    /// whole buffer cannot be written.
    pub fn write(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.written() + data.len() > MESSAGE_LIMIT {
            // No matter the size of the buffer,
            // we always want to stop at the hard-coded message limit.
            Err(EncodeError::TooLong)
        } else {
            self.data.write_all(data).map_err(|_| EncodeError::TooLong)
        }
    }

    /// Writes a name to the message.
    pub fn write_name(&mut self, name: &str) -> Result<(), EncodeError> {
        if !is_valid_name(name) {
            return Err(EncodeError::InvalidName);
        }
        if name == "." {
            return self.write_byte(0);
        }

        let mut total_len = 0;

        for seg in name.strip_suffix('.').unwrap_or(name).split('.') {
            let seg = to_ascii(seg).map_err(|_| EncodeError::InvalidName)?;

            if !is_valid_segment(&seg) || seg.len() > LABEL_LIMIT {
                return Err(EncodeError::InvalidName);
            }

            // Add the size octet and the segment length
            total_len += 1 + seg.len();

            if total_len + 1 > NAME_LIMIT {
                return Err(EncodeError::InvalidName);
            }

            self.write_byte(seg.len() as u8)?;
            self.write(seg.as_bytes())?;
        }

        self.write_byte(0)
    }

    /// Writes a single byte to the message.
    pub fn write_byte(&mut self, data: u8) -> Result<(), EncodeError> {
        self.write(&[data])
    }

    /// Writes an unsigned 16 bit integer in big-endian format.
    pub fn write_u16(&mut self, data: u16) -> Result<(), EncodeError> {
        self.write(&data.to_be_bytes())
    }

    /// Writes an unsigned 32 bit integer in big-endian format.
    pub fn write_u32(&mut self, data: u32) -> Result<(), EncodeError> {
        self.write(&data.to_be_bytes())
    }

    /// Writes a message header
    fn write_header(&mut self, full: &FullHeader) -> Result<(), EncodeError> {
        let header = &full.header;
        let mut flags0 = 0;
        let mut flags1 = 0;

        // 1 bit: query or response flag
        flags0 |= (header.qr as u8 & 1) << 7;
        // 4 bits: opcode
        flags0 |= (header.op.to_u8() & 0b1111) << 3;
        // 1 bit: authoritative answer flag
        flags0 |= (header.authoritative as u8) << 2;
        // 1 bit: truncation flag
        flags0 |= (header.truncated as u8) << 1;
        // 1 bit: recursion desired flag
        flags0 |= header.recursion_desired as u8;

        // 1 bit: recursion available flag
        flags1 |= (header.recursion_available as u8) << 7;
        // 4 bits: response code
        flags1 |= header.rcode.to_u8() & 0b1111;

        self.write_u16(header.id)?;
        self.write_byte(flags0)?;
        self.write_byte(flags1)?;
        self.write_u16(full.qd_count)?;
        self.write_u16(full.an_count)?;
        self.write_u16(full.ns_count)?;
        self.write_u16(full.ar_count)
    }

    /// Writes a question item
    fn write_question(&mut self, question: &Question) -> Result<(), EncodeError> {
        self.write_name(&question.name)?;
        self.write_u16(question.q_type.to_u16())?;
        self.write_u16(question.q_class.to_u16())
    }

    /// Writes a resource record item
    fn write_resource(&mut self, resource: &Resource) -> Result<(), EncodeError> {
        self.write_name(&resource.name)?;
        self.write_u16(resource.r_type.to_u16())?;
        self.write_u16(resource.r_class.to_u16())?;
        self.write_u32(resource.ttl)?;
        self.write_u16(to_u16(resource.data.len())?)?;
        self.write(&resource.data)
    }
}

/// Returns a sequential ID value from a thread-local random starting value.
pub fn generate_id() -> u16 {
    // It's not really necessary for these to be sequential, but it avoids the
    // 1-in-65536 chance of producing the same random number twice in a row.
    thread_local!(static ID: Cell<u16> = Cell::new(random()));
    ID.with(|id| {
        let value = id.get();
        id.set(value.wrapping_add(1));
        value
    })
}

/// Returns whether the given string appears to be a valid hostname.
/// The contents of the name (i.e. characters in labels) are not checked here;
/// only the structure of the name is validated.
fn is_valid_name(name: &str) -> bool {
    let len = name.len();
    len != 0 && (len == 1 || !name.starts_with('.')) && !name.contains("..")
}

/// Returns whether the given string constitutes a valid name segment.
/// This check is not as strict as internet DNS servers will be. It only checks
/// for basic sanity of input. If an invalid name is given, a DNS server will
/// respond that it doesn't exist, anyway.
fn is_valid_segment(s: &str) -> bool {
    !(s.starts_with('-') || s.ends_with('-'))
        && s.chars().all(|c| !(c.is_whitespace() || c.is_control()))
}

/// Represents a DNS message.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Message {
    /// Describes the content of the remainder of the message.
    pub header: Header,
    /// Carries the question of query type messages.
    pub question: Vec<Question>,
    /// Resource records that answer the query
    pub answer: Vec<Resource>,
    /// Resource records that point to an authoritative name server
    pub authority: Vec<Resource>,
    /// Resource records that relate to the query, but are not strictly
    /// answers for the question.
    pub additional: Vec<Resource>,
}

impl Message {
    /// Constructs a new `Message` with a random id value.
    pub fn new() -> Message {
        Message {
            header: Header::new(),
            ..Default::default()
        }
    }

    /// Constructs a recursion-desired query asking for `q_type` records
    /// of `name` in the Internet class.
    pub fn query(name: &str, q_type: RecordType) -> Message {
        let mut msg = Message::new();
        msg.header.recursion_desired = true;
        msg.question.push(Question::new(name.to_owned(), q_type, Class::Internet));
        msg
    }

    /// Constructs an empty response to `query`, carrying its id and question.
    pub fn response_to(query: &Message) -> Message {
        Message {
            header: Header {
                qr: Qr::Response,
                recursion_desired: query.header.recursion_desired,
                recursion_available: true,
                ..Header::with_id(query.header.id)
            },
            question: query.question.clone(),
            ..Default::default()
        }
    }

    /// Decodes a message from a series of bytes.
    pub fn decode(data: &[u8]) -> Result<Message, DecodeError> {
        let mut r = MsgReader::new(data);

        let header = r.read_header()?;
        let mut msg = Message {
            header: header.header,
            ..Default::default()
        };

        for _ in 0..header.qd_count {
            msg.question.push(r.read_question()?);
        }

        for _ in 0..header.an_count {
            msg.answer.push(r.read_resource()?);
        }

        for _ in 0..header.ns_count {
            msg.authority.push(r.read_resource()?);
        }

        for _ in 0..header.ar_count {
            msg.additional.push(r.read_resource()?);
        }

        r.finish()?;
        Ok(msg)
    }

    /// Encodes a message to a series of bytes. On success, returns a subslice
    /// of the given buffer containing only the encoded message bytes.
    pub fn encode<'a>(&self, buf: &'a mut [u8]) -> Result<&'a [u8], EncodeError> {
        let mut w = MsgWriter::new(buf);

        let header = FullHeader {
            header: self.header,
            qd_count: to_u16(self.question.len())?,
            an_count: to_u16(self.answer.len())?,
            ns_count: to_u16(self.authority.len())?,
            ar_count: to_u16(self.additional.len())?,
        };

        w.write_header(&header)?;

        for q in &self.question {
            w.write_question(q)?;
        }
        for r in self.answer.iter().chain(&self.authority).chain(&self.additional) {
            w.write_resource(r)?;
        }

        Ok(w.into_bytes())
    }

    /// Returns a `DnsError` if the message response code is an error.
    pub fn get_error(&self) -> Result<(), DnsError> {
        if self.header.rcode == RCode::NoError {
            Ok(())
        } else {
            Err(DnsError(self.header.rcode))
        }
    }

    /// Decodes every record of type `R` found in the answer section,
    /// in the order the server sent them.
    pub fn answers<R: Record>(&self) -> Result<Vec<R>, DecodeError> {
        let r_type = R::record_type();
        self.answer
            .iter()
            .filter(|rr| rr.r_type == r_type)
            .map(|rr| rr.read_rdata::<R>())
            .collect()
    }
}

/// Represents a message header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// Transaction ID; corresponding replies will have the same ID.
    pub id: u16,
    /// Query or response
    pub qr: Qr,
    /// Kind of query
    pub op: OpCode,
    /// In a response, indicates that the responding name server is an authority
    /// for the domain name in question section.
    pub authoritative: bool,
    /// Indicates whether the message was truncated due to length greater than
    /// that permitted on the transmission channel.
    pub truncated: bool,
    /// In a query, directs the name server to pursue the query recursively.
    pub recursion_desired: bool,
    /// In a response, indicates whether recursive queries are available on the
    /// name server.
    pub recursion_available: bool,
    /// Response code
    pub rcode: RCode,
}

impl Header {
    /// Constructs a new `Header` with a random id value.
    pub fn new() -> Header {
        Header::with_id(generate_id())
    }

    /// Constructs a new `Header` with the given id value.
    pub fn with_id(id: u16) -> Header {
        Header { id, ..Default::default() }
    }
}

impl Default for Header {
    fn default() -> Header {
        Header {
            id: 0,
            qr: Qr::Query,
            op: OpCode::Query,
            authoritative: false,
            truncated: false,
            recursion_desired: false,
            recursion_available: false,
            rcode: RCode::NoError,
        }
    }
}

/// Header plus the section counts, as carried on the wire.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct FullHeader {
    header: Header,
    qd_count: u16,
    an_count: u16,
    ns_count: u16,
    ar_count: u16,
}

/// Represents a question item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Question {
    /// Query name
    pub name: String,
    /// Query type
    pub q_type: RecordType,
    /// Query class
    pub q_class: Class,
}

impl Question {
    /// Constructs a new `Question`.
    pub fn new(name: String, q_type: RecordType, q_class: Class) -> Question {
        Question { name, q_type, q_class }
    }
}

/// Represents a resource record item.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Resource {
    /// Resource name
    pub name: String,
    /// Resource type
    pub r_type: RecordType,
    /// Resource class
    pub r_class: Class,
    /// Time-to-live
    pub ttl: u32,
    /// Record data
    pub data: Vec<u8>,
}

impl Resource {
    /// Constructs a new `Resource`.
    pub fn new(name: String, r_type: RecordType, r_class: Class, ttl: u32) -> Resource {
        Resource { name, r_type, r_class, ttl, data: Vec::new() }
    }

    /// Constructs an Internet-class `Resource` carrying `record` as its rdata.
    pub fn with_record<R: Record>(name: &str, ttl: u32, record: &R) -> Result<Resource, EncodeError> {
        let mut rr = Resource::new(name.to_owned(), R::record_type(), Class::Internet, ttl);
        rr.write_rdata(record)?;
        Ok(rr)
    }

    /// Decodes resource data into the given `Record` type.
    pub fn read_rdata<R: Record>(&self) -> Result<R, DecodeError> {
        let mut r = MsgReader::new(&self.data);
        let res = R::decode(&mut r)?;
        r.finish()?;
        Ok(res)
    }

    /// Encodes resource data from the given `Record` type.
    pub fn write_rdata<R: Record>(&mut self, record: &R) -> Result<(), EncodeError> {
        let mut buf = [0; MESSAGE_LIMIT];
        let mut w = MsgWriter::new(&mut buf[..]);
        record.encode(&mut w)?;
        self.data = w.into_bytes().to_vec();
        Ok(())
    }
}

/// Indicates a message is either a query or response.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Qr {
    /// Query
    Query = 0,
    /// Response
    Response = 1,
}

/// Represents the kind of message query.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpCode {
    /// Query
    Query,
    /// Unrecognized opcode
    Other(u8),
}

impl OpCode {
    /// Converts a `u8` to an `OpCode`.
    pub fn from_u8(u: u8) -> OpCode {
        match u {
            0 => OpCode::Query,
            n => OpCode::Other(n),
        }
    }

    /// Converts an `OpCode` to a `u8`.
    pub fn to_u8(&self) -> u8 {
        match *self {
            OpCode::Query => 0,
            OpCode::Other(n) => n,
        }
    }
}

/// Represents the response code of a message
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RCode {
    /// No error condition.
    NoError,
    /// The server was unable to interpret the query.
    FormatError,
    /// The name server was unable to process the query due to a failure of
    /// the name server.
    ServerFailure,
    /// Name referenced in query does not exist.
    NameError,
    /// Requested query kind is not supported by name server.
    NotImplemented,
    /// The name server refuses to perform the specified operation for policy
    /// reasons.
    Refused,
    /// Unknown response code.
    Other(u8),
}

impl RCode {
    /// Returns an error string for the response code.
    pub fn get_error(&self) -> &'static str {
        match *self {
            RCode::NoError => "no error",
            RCode::FormatError => "format error",
            RCode::ServerFailure => "server failure",
            RCode::NameError => "no such name",
            RCode::NotImplemented => "not implemented",
            RCode::Refused => "refused",
            RCode::Other(_) => "unknown response code",
        }
    }

    /// Converts a `u8` to an `RCode`.
    pub fn from_u8(u: u8) -> RCode {
        match u {
            0 => RCode::NoError,
            1 => RCode::FormatError,
            2 => RCode::ServerFailure,
            3 => RCode::NameError,
            4 => RCode::NotImplemented,
            5 => RCode::Refused,
            n => RCode::Other(n),
        }
    }

    /// Converts an `RCode` to a `u8`.
    pub fn to_u8(&self) -> u8 {
        match *self {
            RCode::NoError => 0,
            RCode::FormatError => 1,
            RCode::ServerFailure => 2,
            RCode::NameError => 3,
            RCode::NotImplemented => 4,
            RCode::Refused => 5,
            RCode::Other(n) => n,
        }
    }
}

fn to_u16(n: usize) -> Result<u16, EncodeError> {
    u16::try_from(n).map_err(|_| EncodeError::TooLong)
}
