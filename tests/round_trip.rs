#![cfg(all(feature = "read", feature = "write"))]

mod round_trip {
    mod archive;
    mod som;
}
