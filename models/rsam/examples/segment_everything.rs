use rsam::Sam;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let sam = Sam::builder().build().await?;
    let image = image::open("examples/landscape.jpg")?;

    let masks = sam.segment_everything(&image)?;
    for (i, mask) in masks.iter().enumerate() {
        mask.to_image().save(format!("{}.png", i))?;
    }

    Ok(())
}
