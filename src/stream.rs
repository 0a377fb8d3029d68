//! Streaming access to the records of a bulk WHOIS XML document.
//!
//! The export is far too big to load, so the document is read event by
//! event. Records of interest are captured as a small [`Element`] tree and
//! handed over one at a time, everything else is skipped over without
//! building anything.
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use flate2::read::MultiGzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Number of records between two progress lines.
const PROGRESS_INTERVAL: usize = 100_000;


//------------ Element ------------------------------------------------------

/// A fully decoded record subtree: element name, text content and child
/// elements. Attributes are not kept, the export does not use them for
/// anything we read.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    name: String,
    text: String,
    children: Vec<Element>
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element { name: name.into(), text: String::new(), children: vec![] }
    }

    fn from_start(start: &BytesStart) -> Self {
        Element::new(String::from_utf8_lossy(start.local_name().as_ref()))
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn text(&self) -> &str { self.text.trim() }

    pub fn children<'a, 'n>(
        &'a self,
        name: &'n str
    ) -> impl Iterator<Item=&'a Element> + 'n where 'a: 'n {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follows a `/` separated path of child names, e.g. `iso3166-1/code2`.
    pub fn child_text(&self, path: &str) -> Option<&str> {
        let mut current = self;
        for name in path.split('/') {
            current = current.child(name)?;
        }
        Some(current.text())
    }
}


//------------ RecordSource -------------------------------------------------

/// The location of a bulk WHOIS export. Every call to `open` starts a
/// fresh read from the beginning, so the two passes do not share state.
#[derive(Clone, Debug)]
pub struct RecordSource {
    path: PathBuf
}

impl RecordSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        RecordSource { path: path.as_ref().to_path_buf() }
    }

    fn is_gzip(&self) -> bool {
        self.path.extension().map(|ext| ext == "gz").unwrap_or(false)
    }

    pub fn open(&self) -> Result<RecordReader<Box<dyn BufRead>>, Error> {
        let file = File::open(&self.path).map_err(|e| Error::read_error(&self.path, e))?;
        let reader: Box<dyn BufRead> = if self.is_gzip() {
            Box::new(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };
        Ok(RecordReader::from_reader(reader))
    }
}


//------------ RecordReader -------------------------------------------------

pub struct RecordReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    skip_buf: Vec<u8>,
    scanned: usize,
}

impl<R: BufRead> RecordReader<R> {
    pub fn from_reader(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text(true);
        RecordReader { reader, buf: vec![], skip_buf: vec![], scanned: 0 }
    }

    /// Number of records seen directly inside the container so far,
    /// matched or skipped.
    pub fn scanned(&self) -> usize { self.scanned }

    /// Descends into the first top-level `container` element and calls
    /// `op` for every direct child named `record`. Other top-level
    /// elements and other records are skipped. Returns the number of
    /// records handed to `op`.
    ///
    /// Running out of input ends the traversal normally. An error from
    /// `op` stops it and is returned as is.
    pub fn for_each<F, E>(
        &mut self,
        container: &str,
        record: &str,
        mut op: F
    ) -> Result<usize, E>
    where F: FnMut(Element) -> Result<(), E>, E: From<Error> {
        loop {
            let descend = match self.reader.read_event_into(&mut self.buf).map_err(Error::xml)? {
                Event::Start(start) => {
                    if start.local_name().as_ref() == container.as_bytes() {
                        true
                    } else {
                        self.reader
                            .read_to_end_into(start.name(), &mut self.skip_buf)
                            .map_err(Error::xml)?;
                        false
                    }
                }
                Event::Eof => return Ok(0),
                _ => false
            };
            self.buf.clear();
            self.skip_buf.clear();

            if descend {
                return self.dispatch(record, &mut op)
            }
        }
    }

    fn dispatch<F, E>(&mut self, record: &str, op: &mut F) -> Result<usize, E>
    where F: FnMut(Element) -> Result<(), E>, E: From<Error> {
        let mut matched = 0;
        loop {
            let (counted, element) = match self.reader.read_event_into(&mut self.buf).map_err(Error::xml)? {
                Event::Start(start) => {
                    if start.local_name().as_ref() == record.as_bytes() {
                        let element = Element::from_start(&start);
                        (true, Some(read_children(&mut self.reader, &mut self.skip_buf, element)?))
                    } else {
                        self.reader
                            .read_to_end_into(start.name(), &mut self.skip_buf)
                            .map_err(Error::xml)?;
                        (true, None)
                    }
                }
                Event::Empty(start) => {
                    if start.local_name().as_ref() == record.as_bytes() {
                        (true, Some(Element::from_start(&start)))
                    } else {
                        (true, None)
                    }
                }
                Event::End(_) | Event::Eof => return Ok(matched),
                _ => (false, None)
            };
            self.buf.clear();
            self.skip_buf.clear();

            if let Some(element) = element {
                matched += 1;
                op(element)?;
            }

            if counted {
                self.scanned += 1;
                if self.scanned % PROGRESS_INTERVAL == 0 {
                    info!(record, scanned = self.scanned, matched, "scanning records");
                }
            }
        }
    }
}

/// Reads the content of `element`, whose start tag was just consumed,
/// up to and including its end tag.
fn read_children<R: BufRead>(
    reader: &mut Reader<R>,
    buf: &mut Vec<u8>,
    element: Element
) -> Result<Element, Error> {
    let mut stack = vec![element];
    loop {
        match reader.read_event_into(buf).map_err(Error::xml)? {
            Event::Start(start) => stack.push(Element::from_start(&start)),
            Event::Empty(start) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Element::from_start(&start));
                }
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(Error::xml)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                // quick-xml has already checked that the end tag matches
                if let Some(done) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done)
                    }
                }
            }
            Event::Eof => {
                let name = stack.first().map(|e| e.name.clone()).unwrap_or_default();
                return Err(Error::UnexpectedEof(name))
            }
            _ => {}
        }
        buf.clear();
    }
}


//------------ Error --------------------------------------------------------

#[derive(Debug, Display)]
pub enum Error {
    #[display(fmt = "Cannot read file: {}", _0)]
    CannotRead(String),

    #[display(fmt = "Error parsing XML: {}", _0)]
    XmlError(String),

    #[display(fmt = "Unexpected end of input inside <{}>", _0)]
    UnexpectedEof(String),
}

impl Error {
    fn read_error(path: &Path, e: impl Display) -> Self {
        Error::CannotRead(format!("{}: {}", path.to_string_lossy(), e))
    }

    fn xml(e: impl Display) -> Self {
        Error::XmlError(format!("{}", e))
    }
}


//------------ Tests --------------------------------------------------------
