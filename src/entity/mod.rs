pub mod categories;
pub mod category_products;
pub mod favourites;
pub mod images;
pub mod locations;
pub mod products;
pub mod users;

pub use categories::Entity as Categories;
pub use category_products::Entity as CategoryProducts;
pub use favourites::Entity as Favourites;
pub use images::Entity as Images;
pub use locations::Entity as Locations;
pub use products::Entity as Products;
pub use users::Entity as Users;
