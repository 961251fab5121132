//! Producer tests against fixture trees and fake tools

#![allow(clippy::float_cmp)]
