use borsh::io;

/// Reads from a byte slice and remembers the first read that wanted more
/// bytes than were left.
pub(crate) struct TrackingReader<'a> {
    rest: &'a [u8],
    shortfall: Option<(usize, usize)>,
}

impl<'a> TrackingReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self {
            rest: bytes,
            shortfall: None,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Bytes wanted and bytes left at the first read past the end.
    pub(crate) fn shortfall(&self) -> Option<(usize, usize)> {
        self.shortfall
    }
}

impl io::Read for TrackingReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = buf.len().min(self.rest.len());
        if count < buf.len() && self.shortfall.is_none() {
            self.shortfall = Some((buf.len(), self.rest.len()));
        }
        let (head, tail) = self.rest.split_at(count);
        buf[..count].copy_from_slice(head);
        self.rest = tail;
        Ok(count)
    }
}
