//! Fragmentation of advertising data
//!
//! Extended advertising data can be longer than what fits within a single HCI command, so it is
//! written with a sequence of commands each carrying a fragment and the fragment's operation.

use crate::hci::FragmentOperation;

/// An iterator over the fragments of advertising data
///
/// Data that fits within a single fragment (including empty data) is a single `Complete`
/// fragment. Otherwise the fragments are a `First`, zero or more `Intermediate`, then a `Last`.
pub(crate) struct Fragments<'a> {
    data: &'a [u8],
    max_fragment_length: usize,
    offset: usize,
    done: bool,
}

impl<'a> Fragments<'a> {
    /// Create a new `Fragments`
    ///
    /// `max_fragment_length` must not be zero.
    pub(crate) fn new(data: &'a [u8], max_fragment_length: usize) -> Self {
        Fragments {
            data,
            max_fragment_length: max_fragment_length.max(1),
            offset: 0,
            done: false,
        }
    }

    /// Check if the data is split into more than one fragment
    pub(crate) fn is_fragmented(&self) -> bool {
        self.data.len() > self.max_fragment_length
    }
}

impl<'a> Iterator for Fragments<'a> {
    type Item = (FragmentOperation, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.is_fragmented() {
            self.done = true;

            return Some((FragmentOperation::Complete, self.data));
        }

        let remaining = &self.data[self.offset..];

        let length = remaining.len().min(self.max_fragment_length);

        let operation = if self.offset == 0 {
            FragmentOperation::First
        } else if length == remaining.len() {
            FragmentOperation::Last
        } else {
            FragmentOperation::Intermediate
        };

        self.offset += length;

        self.done = self.offset == self.data.len();

        Some((operation, &remaining[..length]))
    }
}
