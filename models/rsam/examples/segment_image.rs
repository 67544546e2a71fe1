use rsam::{Sam, SamPrompt, SamSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pass a ViT-L checkpoint path to reproduce the full-size model, or run
    // with no arguments to download the tiny checkpoint.
    let source = match std::env::args().nth(1) {
        Some(checkpoint) => SamSource::vit_l_from(checkpoint),
        None => SamSource::mobile_sam_tiny(),
    };
    let sam = Sam::builder().source(source).build().await?;

    let image = image::open("examples/landscape.jpg")?;
    let mut predictor = sam.predictor();
    predictor.set_image(&image)?;

    let prediction = predictor.predict(&SamPrompt::default())?;
    let mask = prediction.best();
    println!(
        "mask covers {} of {} pixels (predicted iou {:?})",
        mask.area(),
        mask.width() as usize * mask.height() as usize,
        mask.score()
    );
    mask.to_image().save("mask.png")?;

    Ok(())
}
