use std::io;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
        /// Malformed GIF data from the wire reader or the LZW stream.
        Format(reason: &'static str) {
            display("invalid GIF data: {}", reason)
        }
        /// Screen or subframe dimensions failed a sanity check.
        Geometry(reason: &'static str) {
            display("bad image geometry: {}", reason)
        }
        NoPalette {
            display("image has neither a local nor a global palette")
        }
        OutOfMemory {
            display("not enough memory for the canvas")
        }
    }
}

pub type CatResult<T, E = Error> = Result<T, E>;
