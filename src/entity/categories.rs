use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::category_products::Entity")]
    CategoryProducts,
}

impl Related<super::category_products::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CategoryProducts.def()
    }
}

impl Related<super::products::Entity> for Entity {
    fn to() -> RelationDef {
        super::category_products::Relation::Products.def()
    }

    fn via() -> Option<RelationDef> {
        Some(super::category_products::Relation::Categories.def().rev())
    }
}

impl ActiveModelBehavior for ActiveModel {}
