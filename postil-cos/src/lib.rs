/*!
The COS core of the Postil annotation editor.

This crate implements the low-level byte grammar of PDF (the *Carousel Object
System*) together with the object model the editor mutates: a random-access
byte reader, a lexer that classifies values and computes their bounds, typed
leaf parsers, an index of indirect objects, and an owned object tree that
tracks edits and serializes back to bytes for incremental-update writes.

It deliberately stops there. Rendering, fonts, page layout and the annotation
tools live in the host application; they consume this crate through the
object model and the [`Resolve`] contract.

# Example

```rust
use postil_cos::{ObjectIndex, PdfDict, Resolve};

let data = b"3 0 obj << /Type /Annot /Subtype /Square >> endobj\n".to_vec();

let index = ObjectIndex::build(&data).unwrap();
let info = index.resolve(3).unwrap();
let annot = PdfDict::parse(&info, Some(&index)).unwrap();

assert_eq!(annot.get(b"Subtype").unwrap().as_name().unwrap().as_str(), "Square");
```

# Leniency

Real-world PDFs are routinely broken. The parsers follow the same posture
throughout: a miss is `None`, recoverable damage is logged once and dropped
locally (a dangling reference costs one resource entry, not the document),
and only serialization errors are hard failures.
*/

pub mod crypt;
pub mod error;
pub mod filter;
pub mod index;
pub mod lexer;
pub mod object;
pub mod parse;
pub mod reader;
pub mod trivia;

mod util;

pub use crypt::{Crypt, CryptInfo};
pub use error::{Error, Result};
pub use index::{ObjectIndex, ParseInfo, Resolve};
pub use lexer::{Bounds, Lexer, Span, ValueKind};
pub use object::{
    change_channel, ChangeSink, Name, Number, ObjectId, PdfDict, PdfObject, PdfStream,
    ResourceDict,
};
pub use reader::{Direction, Reader, Search};
