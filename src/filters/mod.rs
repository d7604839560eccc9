pub mod complementary;

pub use complementary::ComplementaryFilter;
